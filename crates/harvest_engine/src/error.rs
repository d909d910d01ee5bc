use std::io;

use thiserror::Error;

use crate::persist::PersistError;
use crate::DriverError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("driver failure: {0}")]
    Driver(#[from] DriverError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("persistence failure: {0}")]
    Persist(#[from] PersistError),
}

impl HarvestError {
    /// True when the view can no longer be driven.
    pub fn is_fatal(&self) -> bool {
        match self {
            HarvestError::Driver(err) => err.is_fatal(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config: {0}")]
    Parse(String),
}
