use std::time::Duration;

use harvest_core::{EscalationTier, HarvestState, ReferenceStore, StopReason};
use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::discovery::discover;
use crate::driver::query_first;
use crate::{
    ActionKind, ActionTarget, DriverError, HarvestConfig, HarvestError, SiteProfile, ViewDriver,
    WaitCondition,
};

/// Window scroll step used while re-populating a reloaded list.
const RELOAD_SCROLL_PX: i64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestReport {
    pub stop_reason: StopReason,
    /// Load-more triggers performed.
    pub iterations: u32,
    /// References this run added to the store.
    pub added: usize,
    /// Recovery tiers in the order they fired.
    pub escalations: Vec<EscalationTier>,
}

/// Drives incremental loading of the list view until the store holds
/// `target` references or the source looks exhausted.
pub struct HarvestLoop<'a> {
    config: &'a HarvestConfig,
    profile: &'a SiteProfile,
}

impl<'a> HarvestLoop<'a> {
    pub fn new(config: &'a HarvestConfig, profile: &'a SiteProfile) -> Self {
        Self { config, profile }
    }

    /// Fills `store` from the current view. Cancellation is a normal stop;
    /// only fatal driver errors are returned.
    pub async fn harvest(
        &self,
        driver: &dyn ViewDriver,
        store: &ReferenceStore,
        target: usize,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        let max_iterations = self.config.max_iterations_for(target);
        let mut state = HarvestState::new(self.config.escalation.clone(), target, max_iterations);
        let initial = store.len();
        let mut escalations = Vec::new();

        harvest_info!(
            "Harvesting up to {} references (at most {} load-more iterations)",
            target,
            max_iterations
        );

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let delta = discover(
                driver,
                &self.profile.discovery,
                store,
                target,
                self.config.transient_retries,
            )
            .await?;

            if let Some(tier) = state.observe(delta, store.len()) {
                harvest_info!(
                    "No new references for {} iterations, escalating to {}",
                    state.no_progress(),
                    tier
                );
                escalations.push(tier);
                self.recover(driver, tier).await?;
            }

            harvest_debug!(
                "Iteration {}: +{} references, {} total, no progress for {}",
                state.iteration() + 1,
                delta,
                store.len(),
                state.no_progress()
            );

            if let Some(reason) = state.stop_reason() {
                break reason;
            }

            self.load_more(driver).await?;

            let range = if delta > 0 {
                self.config.fast_delay
            } else {
                self.config.idle_delay
            };
            if pause(range.sample(), cancel).await {
                break StopReason::Cancelled;
            }

            state.advance();
            if let Some(reason) = state.stop_reason() {
                break reason;
            }
        };

        let report = HarvestReport {
            stop_reason,
            iterations: state.iteration(),
            added: store.len().saturating_sub(initial),
            escalations,
        };
        harvest_info!(
            "Harvest stopped ({}): {} references after {} iterations",
            report.stop_reason,
            store.len(),
            report.iterations
        );
        Ok(report)
    }

    // Container first, then the window, then the keyboard.
    async fn load_more(&self, driver: &dyn ViewDriver) -> Result<(), DriverError> {
        if let Some(container) = query_first(driver, &self.profile.result_containers).await? {
            let result = driver
                .invoke_action(ActionTarget::Element(container), ActionKind::ScrollToEnd)
                .await;
            if attempt(result, "container scroll")? {
                return Ok(());
            }
        }

        let result = driver
            .invoke_action(ActionTarget::Window, ActionKind::ScrollToEnd)
            .await;
        if attempt(result, "window scroll")? {
            return Ok(());
        }

        let result = driver
            .invoke_action(ActionTarget::Window, ActionKind::PageDown)
            .await;
        if !attempt(result, "page-down")? {
            harvest_warn!("Every load-more action failed this iteration");
        }
        Ok(())
    }

    async fn recover(&self, driver: &dyn ViewDriver, tier: EscalationTier) -> Result<(), DriverError> {
        match tier {
            EscalationTier::None => Ok(()),
            EscalationTier::AlternateControl => self.alternate_control(driver).await,
            EscalationTier::Reload => self.reload(driver).await,
            EscalationTier::ZoomOut => self.zoom_out(driver).await,
        }
    }

    async fn alternate_control(&self, driver: &dyn ViewDriver) -> Result<(), DriverError> {
        if let Some(control) = query_first(driver, &self.profile.show_more_controls).await? {
            let result = driver
                .invoke_action(ActionTarget::Element(control), ActionKind::Click)
                .await;
            if attempt(result, "show-more click")? {
                return Ok(());
            }
        }

        for _ in 0..self.config.alternate_key_presses {
            let result = driver
                .invoke_action(ActionTarget::Window, ActionKind::PageDown)
                .await;
            if !attempt(result, "page-down")? {
                break;
            }
        }
        Ok(())
    }

    async fn reload(&self, driver: &dyn ViewDriver) -> Result<(), DriverError> {
        let result = driver
            .invoke_action(ActionTarget::Window, ActionKind::Reload)
            .await;
        if !attempt(result, "reload")? {
            return Ok(());
        }

        let condition = WaitCondition::AnyPresent(self.profile.results_markers.clone());
        match driver
            .wait_until(&condition, self.config.marker_timeout())
            .await
        {
            Ok(true) => {}
            Ok(false) => harvest_warn!("Results marker did not reappear after reload"),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => harvest_warn!("Waiting for results after reload failed: {}", err),
        }

        for _ in 0..self.config.reload_scrolls {
            let result = driver
                .invoke_action(ActionTarget::Window, ActionKind::ScrollBy(RELOAD_SCROLL_PX))
                .await;
            if !attempt(result, "post-reload scroll")? {
                break;
            }
        }
        Ok(())
    }

    async fn zoom_out(&self, driver: &dyn ViewDriver) -> Result<(), DriverError> {
        let mut clicks = 0;
        while clicks < self.config.zoom_out_clicks {
            let Some(control) = query_first(driver, &self.profile.zoom_out_controls).await? else {
                break;
            };
            let result = driver
                .invoke_action(ActionTarget::Element(control), ActionKind::Click)
                .await;
            if !attempt(result, "zoom-out click")? {
                break;
            }
            clicks += 1;
        }

        if clicks == 0 {
            let result = driver
                .invoke_action(ActionTarget::Window, ActionKind::ZoomOut)
                .await;
            attempt(result, "keyboard zoom-out")?;
        }
        Ok(())
    }
}

/// `Ok(true)` when the action ran, `Ok(false)` when it failed in a way the
/// caller may ignore.
fn attempt(result: Result<(), DriverError>, action: &str) -> Result<bool, DriverError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            harvest_debug!("{} failed: {}", action, err);
            Ok(false)
        }
    }
}

/// Sleeps for `delay`; returns `true` if cancelled first.
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
