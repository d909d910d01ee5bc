//! Ordered, fallback-driven field extraction.
//!
//! A [`StrategyChain`] is a data table: each [`Strategy`] names where to look
//! (a selector), what to read (attribute sources) and how to interpret it
//! (a [`Parse`]). The chain's [`Validity`] decides whether a parsed value is
//! good enough; the first one that is wins.

use harvest_core::{FieldKey, FieldValue, Parse, PhoneNormalizer, Validity};
use harvest_logging::{harvest_debug, harvest_trace};
use serde::{Deserialize, Serialize};

use crate::{DriverError, Selector, ViewDriver, INNER_TEXT};

const DEFAULT_MAX_HANDLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub selector: Selector,
    /// Attribute names read from each matched element, in order.
    pub sources: Vec<String>,
    pub parse: Parse,
}

impl Strategy {
    pub fn new(selector: &str, sources: &[&str], parse: Parse) -> Self {
        Self {
            selector: Selector::css(selector),
            sources: sources.iter().map(|source| source.to_string()).collect(),
            parse,
        }
    }

    /// Rendered text, parsed as plain text.
    pub fn text(selector: &str) -> Self {
        Self::new(selector, &[INNER_TEXT], Parse::Text)
    }
}

/// Strategies for one field category. The order is fixed once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyChain {
    key: FieldKey,
    strategies: Vec<Strategy>,
    validity: Validity,
    #[serde(default = "default_max_handles")]
    max_handles: usize,
}

fn default_max_handles() -> usize {
    DEFAULT_MAX_HANDLES
}

impl StrategyChain {
    pub fn new(key: FieldKey, validity: Validity) -> Self {
        Self {
            key,
            strategies: Vec::new(),
            validity,
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }

    /// Appends a strategy tried after every strategy added before it.
    pub fn then(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Caps how many matched elements of one strategy are inspected.
    pub fn max_handles(mut self, max_handles: usize) -> Self {
        self.max_handles = max_handles.max(1);
        self
    }

    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    /// Runs the strategies in declaration order against the current view.
    ///
    /// Misses and transient driver failures fall through to the next
    /// candidate; only fatal driver errors are returned. Phone candidates
    /// are normalized with `phones` before they are judged.
    pub async fn extract(
        &self,
        driver: &dyn ViewDriver,
        phones: &PhoneNormalizer,
    ) -> Result<FieldValue, DriverError> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            let handles = match driver.query_all(&strategy.selector).await {
                Ok(handles) => handles,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    harvest_debug!(
                        "{} strategy {} ({}) failed: {}",
                        self.key,
                        index,
                        strategy.selector,
                        err
                    );
                    continue;
                }
            };

            for handle in handles.iter().take(self.max_handles) {
                for source in &strategy.sources {
                    let raw = match driver.read_attribute(handle, source).await {
                        Ok(Some(raw)) => raw,
                        Ok(None) => continue,
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            harvest_trace!("{} read {} failed: {}", self.key, source, err);
                            continue;
                        }
                    };
                    let value = self.validity.refine(strategy.parse.apply(&raw), phones);
                    if self.validity.accepts(&value) {
                        harvest_trace!("{} resolved by strategy {}", self.key, index);
                        return Ok(value);
                    }
                }
            }
        }
        Ok(FieldValue::Absent)
    }
}
