use harvest_core::{ItemReference, Record};

use crate::{DriverError, HarvestError, ViewDriver};

/// Observer callbacks invoked by the session. Errors are logged by the
/// caller and never abort harvesting.
pub trait SessionHooks: Send + Sync {
    fn after_discovery(&self, _references: &[ItemReference]) -> Result<(), HarvestError> {
        Ok(())
    }

    /// `all` holds every useful record so far, `record` included.
    fn after_record(&self, _record: &Record, _all: &[Record]) -> Result<(), HarvestError> {
        Ok(())
    }

    fn after_extraction(&self, _records: &[Record]) -> Result<(), HarvestError> {
        Ok(())
    }

    /// Something worth capturing evidence for happened, e.g. a detail view
    /// whose content marker never appeared.
    fn on_diagnostic(&self, _label: &str, _detail: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// Dismisses whatever overlay blocks the first detail view of a session.
#[async_trait::async_trait]
pub trait ConsentHandler: Send + Sync {
    async fn settle(&self, driver: &dyn ViewDriver) -> Result<(), DriverError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoConsent;

#[async_trait::async_trait]
impl ConsentHandler for NoConsent {
    async fn settle(&self, _driver: &dyn ViewDriver) -> Result<(), DriverError> {
        Ok(())
    }
}
