use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use harvest_core::{ItemReference, PhoneNormalizer, Record};
use harvest_logging::{harvest_debug, harvest_warn};

use crate::{ConsentHandler, DriverError, SessionHooks, SiteProfile, ViewDriver, WaitCondition};

const DEFAULT_NAVIGATE_RETRIES: u32 = 2;

/// Visits one reference's detail view and runs every strategy chain of the
/// profile against it.
///
/// Extraction navigates the driver away from wherever it was; callers must
/// not rely on the list view still being loaded afterwards.
pub struct DetailExtractor<'a> {
    profile: &'a SiteProfile,
    timeout: Duration,
    consent: &'a dyn ConsentHandler,
    hooks: &'a dyn SessionHooks,
    phones: PhoneNormalizer,
    navigate_retries: u32,
    settled: AtomicBool,
}

impl<'a> DetailExtractor<'a> {
    pub fn new(
        profile: &'a SiteProfile,
        timeout: Duration,
        consent: &'a dyn ConsentHandler,
        hooks: &'a dyn SessionHooks,
    ) -> Self {
        Self {
            profile,
            timeout,
            consent,
            hooks,
            phones: PhoneNormalizer::default(),
            navigate_retries: DEFAULT_NAVIGATE_RETRIES,
            settled: AtomicBool::new(false),
        }
    }

    pub fn with_phone_normalizer(mut self, phones: PhoneNormalizer) -> Self {
        self.phones = phones;
        self
    }

    /// Extra navigation attempts after a transient failure.
    pub fn with_navigate_retries(mut self, retries: u32) -> Self {
        self.navigate_retries = retries;
        self
    }

    async fn open(
        &self,
        driver: &dyn ViewDriver,
        reference: &ItemReference,
    ) -> Result<(), DriverError> {
        let mut attempt = 0;
        loop {
            match driver.navigate(reference.as_str()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.navigate_retries => {
                    attempt += 1;
                    harvest_debug!(
                        "Opening {} failed ({}), retry {}/{}",
                        reference,
                        err,
                        attempt,
                        self.navigate_retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn extract(
        &self,
        driver: &dyn ViewDriver,
        reference: &ItemReference,
        query: &str,
    ) -> Result<Record, DriverError> {
        self.open(driver, reference).await?;

        if !self.settled.swap(true, Ordering::SeqCst) {
            match self.consent.settle(driver).await {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => harvest_warn!("Consent handling failed: {}", err),
            }
        }

        let condition = WaitCondition::AnyPresent(self.profile.detail_markers.clone());
        match driver.wait_until(&condition, self.timeout).await {
            Ok(true) => {}
            Ok(false) => {
                harvest_warn!("Detail view for {} did not render in time", reference);
                self.hooks
                    .on_diagnostic("detail_timeout", reference.as_str());
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => harvest_warn!("Waiting for detail view {} failed: {}", reference, err),
        }

        let mut record = Record::for_reference(reference, query);
        for chain in &self.profile.chains {
            let value = chain.extract(driver, &self.phones).await?;
            record.set(chain.key(), value);
        }
        harvest_debug!(
            "Extracted {} ({})",
            reference,
            record.name().unwrap_or("no name")
        );
        Ok(record)
    }
}
