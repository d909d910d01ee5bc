use serde::{Deserialize, Serialize};

/// Per-session extraction counters, owned by the orchestrator and passed
/// explicitly to whatever reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub contacts_found: usize,
}

impl SessionCounters {
    pub fn record_success(&mut self, has_contact: bool) {
        self.attempted += 1;
        self.succeeded += 1;
        if has_contact {
            self.contacts_found += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.attempted += 1;
        self.failed += 1;
    }

    /// Share of attempted items that produced a useful record, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.attempted as f64
        }
    }
}
