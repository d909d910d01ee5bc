use harvest_core::{ItemReference, ReferenceStore};
use harvest_logging::{harvest_debug, harvest_warn};
use serde::{Deserialize, Serialize};

use crate::{DriverError, Selector, ViewDriver};

/// One way of locating item links in the list view, most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryTier {
    pub selector: Selector,
    /// Attribute holding the reference, usually `href`.
    pub attribute: String,
    /// Substring a raw reference must contain; empty accepts anything.
    pub marker: String,
}

impl DiscoveryTier {
    pub fn links(selector: &str, marker: &str) -> Self {
        Self {
            selector: Selector::css(selector),
            attribute: "href".to_string(),
            marker: marker.to_string(),
        }
    }

    fn accepts(&self, raw: &str) -> bool {
        self.marker.is_empty() || raw.contains(&self.marker)
    }
}

/// One discovery pass. The first tier that matches any element wins; the
/// store never grows past `target`. Returns the number of new references.
pub(crate) async fn discover(
    driver: &dyn ViewDriver,
    tiers: &[DiscoveryTier],
    store: &ReferenceStore,
    target: usize,
    transient_retries: u32,
) -> Result<usize, DriverError> {
    let mut added = 0;
    for tier in tiers {
        let mut attempt = 0;
        loop {
            match collect_tier(driver, tier, store, target, &mut added).await {
                Ok(true) => return Ok(added),
                Ok(false) => break,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) if attempt < transient_retries => {
                    attempt += 1;
                    harvest_debug!(
                        "Discovery tier {} failed ({}), retry {}/{}",
                        tier.selector,
                        err,
                        attempt,
                        transient_retries
                    );
                }
                Err(err) => {
                    harvest_warn!(
                        "Discovery tier {} gave up after {} retries: {}",
                        tier.selector,
                        transient_retries,
                        err
                    );
                    break;
                }
            }
        }
    }
    Ok(added)
}

// Ok(false) means the tier matched nothing and the next one should run.
async fn collect_tier(
    driver: &dyn ViewDriver,
    tier: &DiscoveryTier,
    store: &ReferenceStore,
    target: usize,
    added: &mut usize,
) -> Result<bool, DriverError> {
    let handles = driver.query_all(&tier.selector).await?;
    if handles.is_empty() {
        return Ok(false);
    }

    for handle in &handles {
        if store.len() >= target {
            break;
        }
        let Some(raw) = driver.read_attribute(handle, &tier.attribute).await? else {
            continue;
        };
        if !tier.accepts(&raw) {
            continue;
        }
        if let Some(reference) = ItemReference::canonical(&raw) {
            if store.add(reference) {
                *added += 1;
            }
        }
    }
    Ok(true)
}
