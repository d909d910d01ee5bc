use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use harvest_core::Record;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::hooks::SessionHooks;
use crate::HarvestError;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Creates `dir` when missing and checks that records can be written there.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |e: io::Error| PersistError::OutputDir(format!("{}: {e}", dir.display()));
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(_) => {}
        Err(_) => fs::create_dir_all(dir).map_err(unusable)?,
    }
    NamedTempFile::new_in(dir).map_err(unusable)?;
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` through a temp file rename.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Progress hook that rewrites the whole record list as pretty JSON after
/// every record and once more when extraction ends. Readers only ever see
/// a complete file.
pub struct JsonProgressWriter {
    writer: AtomicFileWriter,
    filename: String,
}

impl JsonProgressWriter {
    pub fn new(dir: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            filename: filename.into(),
        }
    }

    pub fn write_records(&self, records: &[Record]) -> Result<PathBuf, PersistError> {
        let json = serde_json::to_string_pretty(records)?;
        self.writer.write(&self.filename, &json)
    }
}

impl SessionHooks for JsonProgressWriter {
    fn after_record(&self, _record: &Record, all: &[Record]) -> Result<(), HarvestError> {
        self.write_records(all)?;
        Ok(())
    }

    fn after_extraction(&self, records: &[Record]) -> Result<(), HarvestError> {
        let path = self.write_records(records)?;
        harvest_logging::harvest_info!(
            "Saved {} records to {}",
            records.len(),
            path.display()
        );
        Ok(())
    }
}
