use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use harvest_core::{PhoneNormalizer, Record, ReferenceStore, SessionCounters};
use harvest_logging::{harvest_debug, harvest_error, harvest_info, harvest_warn};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::harvest::pause;
use crate::{
    ConsentHandler, DetailExtractor, HarvestError, HarvestLoop, HarvestReport, NoConsent,
    NoopHooks, SessionConfig, SessionHooks, ViewDriver, WaitCondition,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    /// The session stopped early; the reason is the fatal error or panic.
    Aborted(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Useful records in discovery order.
    pub records: Vec<Record>,
    pub counters: SessionCounters,
    /// Combined report of every harvest loop run, if discovery started.
    pub discovery: Option<HarvestReport>,
    pub outcome: SessionOutcome,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Progress {
    records: Vec<Record>,
    counters: SessionCounters,
    discovery: Option<HarvestReport>,
}

/// Orchestrates discovery and extraction for one query on one driver.
pub struct HarvestSession {
    config: SessionConfig,
    normalizer: PhoneNormalizer,
    hooks: Arc<dyn SessionHooks>,
    consent: Arc<dyn ConsentHandler>,
}

impl HarvestSession {
    pub fn new(config: SessionConfig) -> Self {
        let normalizer = PhoneNormalizer::new(config.phone.clone());
        Self {
            config,
            normalizer,
            hooks: Arc::new(NoopHooks),
            consent: Arc::new(NoConsent),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_consent(mut self, consent: Arc<dyn ConsentHandler>) -> Self {
        self.consent = consent;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs the whole session and closes `driver` on every exit path.
    ///
    /// Never returns an error: fatal failures and panics end the session
    /// early with [`SessionOutcome::Aborted`], keeping the records
    /// collected so far.
    pub async fn run<D: ViewDriver>(
        &self,
        driver: D,
        query: &str,
        target: usize,
        cancel: CancellationToken,
    ) -> SessionReport {
        let started = Instant::now();
        let mut progress = Progress::default();

        let result = AssertUnwindSafe(self.drive(&driver, query, target, &cancel, &mut progress))
            .catch_unwind()
            .await;
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                harvest_error!("Session for '{}' aborted: {}", query, err);
                SessionOutcome::Aborted(err.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                harvest_error!("Session for '{}' panicked: {}", query, reason);
                SessionOutcome::Aborted(format!("panic: {reason}"))
            }
        };

        if let Err(err) = driver.close().await {
            harvest_warn!("Closing the driver failed: {}", err);
        }

        let counters = progress.counters;
        harvest_info!(
            "Session for '{}' finished ({:?}): {} records, {} attempted, {} failed, {} with contact, {:.1}% success",
            query,
            outcome,
            progress.records.len(),
            counters.attempted,
            counters.failed,
            counters.contacts_found,
            counters.success_rate()
        );

        SessionReport {
            records: progress.records,
            counters,
            discovery: progress.discovery,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn drive(
        &self,
        driver: &dyn ViewDriver,
        query: &str,
        target: usize,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<SessionOutcome, HarvestError> {
        if target == 0 {
            harvest_info!("Nothing to harvest for '{}': target is zero", query);
            return Ok(SessionOutcome::Completed);
        }

        let store = ReferenceStore::new();
        let harvest_loop = HarvestLoop::new(&self.config.harvest, &self.config.profile);

        let report = self
            .discover_query(driver, &harvest_loop, query, &store, target, cancel)
            .await?;
        merge_report(&mut progress.discovery, report);

        let min_results = self.config.min_results.min(target);
        for variation in self.config.variations_for(query) {
            if store.len() >= min_results || cancel.is_cancelled() {
                break;
            }
            harvest_info!(
                "Only {} references so far, trying '{}'",
                store.len(),
                variation
            );
            match self
                .discover_query(driver, &harvest_loop, &variation, &store, target, cancel)
                .await
            {
                Ok(report) => merge_report(&mut progress.discovery, report),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => harvest_warn!("Variation '{}' failed: {}", variation, err),
            }
        }

        let references = store.to_vec();
        harvest_info!("Discovered {} references for '{}'", references.len(), query);
        notify("after_discovery", self.hooks.after_discovery(&references));
        if cancel.is_cancelled() {
            return Ok(SessionOutcome::Cancelled);
        }

        let outcome = self
            .extract_all(driver, &references, query, cancel, progress)
            .await;
        notify("after_extraction", self.hooks.after_extraction(&progress.records));
        outcome
    }

    async fn discover_query(
        &self,
        driver: &dyn ViewDriver,
        harvest_loop: &HarvestLoop<'_>,
        query: &str,
        store: &ReferenceStore,
        target: usize,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        let url = self.config.profile.search_url(query);
        harvest_info!("Searching '{}' at {}", query, url);
        driver.navigate(&url).await?;

        let condition = WaitCondition::AnyPresent(self.config.profile.results_markers.clone());
        match driver
            .wait_until(&condition, self.config.search_timeout())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                harvest_warn!("Timed out waiting for results of '{}', continuing", query);
                self.hooks.on_diagnostic("results_timeout", query);
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => harvest_warn!("Waiting for results of '{}' failed: {}", query, err),
        }

        harvest_loop.harvest(driver, store, target, cancel).await
    }

    async fn extract_all(
        &self,
        driver: &dyn ViewDriver,
        references: &[harvest_core::ItemReference],
        query: &str,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<SessionOutcome, HarvestError> {
        let extractor = DetailExtractor::new(
            &self.config.profile,
            self.config.detail_timeout(),
            self.consent.as_ref(),
            self.hooks.as_ref(),
        )
        .with_phone_normalizer(self.normalizer.clone())
        .with_navigate_retries(self.config.harvest.transient_retries);
        let started = Instant::now();

        for (index, reference) in references.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            match extractor.extract(driver, reference, query).await {
                Ok(record) => {
                    if record.is_useful() {
                        progress.counters.record_success(record.has_contact());
                        progress.records.push(record);
                        if let Some(last) = progress.records.last() {
                            notify("after_record", self.hooks.after_record(last, &progress.records));
                        }
                    } else {
                        harvest_debug!("Skipping {}: no usable name", reference);
                        progress.counters.record_failure();
                    }
                }
                Err(err) if err.is_fatal() => {
                    progress.counters.record_failure();
                    return Err(err.into());
                }
                Err(err) => {
                    harvest_warn!("Extraction of {} failed: {}", reference, err);
                    progress.counters.record_failure();
                }
            }

            let attempted = progress.counters.attempted;
            let every = self.config.progress_every;
            if every > 0 && attempted % every == 0 {
                let minutes = started.elapsed().as_secs_f64() / 60.0;
                let rate = if minutes > 0.0 {
                    attempted as f64 / minutes
                } else {
                    0.0
                };
                harvest_info!(
                    "Progress: {}/{} processed, {} useful, {:.1} items/min",
                    attempted,
                    references.len(),
                    progress.counters.succeeded,
                    rate
                );
            }

            let is_last = index + 1 == references.len();
            if !is_last && pause(self.config.pacing.sample(), cancel).await {
                return Ok(SessionOutcome::Cancelled);
            }
        }
        Ok(SessionOutcome::Completed)
    }
}

fn merge_report(slot: &mut Option<HarvestReport>, next: HarvestReport) {
    match slot {
        Some(report) => {
            report.stop_reason = next.stop_reason;
            report.iterations += next.iterations;
            report.added += next.added;
            report.escalations.extend(next.escalations);
        }
        None => *slot = Some(next),
    }
}

fn notify(hook: &str, result: Result<(), HarvestError>) {
    if let Err(err) = result {
        harvest_warn!("Hook {} failed: {}", hook, err);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
