use std::fs;
use std::path::Path;
use std::time::Duration;

use harvest_core::{EscalationPolicy, PhoneSettings};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, SiteProfile};

/// Inclusive range of milliseconds a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn sample(&self) -> Duration {
        let (low, high) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        if low == high {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Settings of one harvest loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub escalation: EscalationPolicy,
    /// Load-more ceiling; derived from the target when unset.
    pub max_iterations: Option<u32>,
    /// Pause after an iteration that found new references.
    pub fast_delay: DelayRange,
    /// Pause after an iteration that found nothing.
    pub idle_delay: DelayRange,
    /// Extra attempts on a discovery tier after a transient failure.
    pub transient_retries: u32,
    pub alternate_key_presses: u32,
    pub reload_scrolls: u32,
    pub zoom_out_clicks: u32,
    /// Upper bound for waiting on the results marker after a reload.
    pub marker_timeout_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationPolicy::default(),
            max_iterations: None,
            fast_delay: DelayRange::new(100, 500),
            idle_delay: DelayRange::new(500, 1000),
            transient_retries: 2,
            alternate_key_presses: 3,
            reload_scrolls: 3,
            zoom_out_clicks: 3,
            marker_timeout_ms: 10_000,
        }
    }
}

impl HarvestConfig {
    pub fn max_iterations_for(&self, target: usize) -> u32 {
        self.max_iterations
            .unwrap_or_else(|| u32::try_from(target).unwrap_or(u32::MAX).clamp(20, 50))
    }

    pub fn marker_timeout(&self) -> Duration {
        Duration::from_millis(self.marker_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub harvest: HarvestConfig,
    /// Pause between two detail extractions.
    pub pacing: DelayRange,
    /// Below this many references the query variations are tried too.
    pub min_results: usize,
    /// Templates with a `{query}` placeholder.
    pub query_variations: Vec<String>,
    pub search_timeout_ms: u64,
    pub detail_timeout_ms: u64,
    /// Progress is logged every this many attempted items; 0 disables it.
    pub progress_every: usize,
    pub phone: PhoneSettings,
    pub profile: SiteProfile,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            pacing: DelayRange::new(1500, 3500),
            min_results: 10,
            query_variations: vec![
                "{query} near me".to_string(),
                "best {query}".to_string(),
                "top rated {query}".to_string(),
            ],
            search_timeout_ms: 15_000,
            detail_timeout_ms: 10_000,
            progress_every: 10,
            phone: PhoneSettings::default(),
            profile: SiteProfile::maps(),
        }
    }
}

impl SessionConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        harvest_logging::harvest_info!("Loaded session config from {:?}", path);
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::new();
        ron::ser::to_string_pretty(self, pretty).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    /// Query variations expanded for `query`, skipping blanks and repeats
    /// of the query itself.
    pub fn variations_for(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        let mut variations: Vec<String> = Vec::new();
        for template in &self.query_variations {
            let variation = template.replace("{query}", query).trim().to_string();
            if variation.is_empty() || variation == query || variations.contains(&variation) {
                continue;
            }
            variations.push(variation);
        }
        variations
    }
}
