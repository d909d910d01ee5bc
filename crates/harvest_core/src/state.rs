use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of the recovery action taken after repeated iterations without
/// new references. Ordered from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EscalationTier {
    None,
    /// Click an alternate load-more control or page with the keyboard.
    AlternateControl,
    /// Reload the view and re-scroll.
    Reload,
    /// Zoom out / reset the view to surface more items.
    ZoomOut,
}

impl fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EscalationTier::None => "none",
            EscalationTier::AlternateControl => "alternate-control",
            EscalationTier::Reload => "reload",
            EscalationTier::ZoomOut => "zoom-out",
        };
        f.write_str(label)
    }
}

/// No-progress thresholds at which each tier fires, plus the patience
/// ceiling after which the loop gives up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    pub alternate_control_after: u32,
    pub reload_after: u32,
    pub zoom_out_after: u32,
    pub patience: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            alternate_control_after: 3,
            reload_after: 6,
            zoom_out_after: 10,
            patience: 12,
        }
    }
}

impl EscalationPolicy {
    fn thresholds(&self) -> [(u32, EscalationTier); 3] {
        [
            (self.alternate_control_after, EscalationTier::AlternateControl),
            (self.reload_after, EscalationTier::Reload),
            (self.zoom_out_after, EscalationTier::ZoomOut),
        ]
    }

    /// Highest tier whose threshold is reached at `no_progress` iterations.
    pub fn tier_for(&self, no_progress: u32) -> EscalationTier {
        self.thresholds()
            .iter()
            .filter(|(threshold, _)| *threshold > 0 && no_progress >= *threshold)
            .map(|(_, tier)| *tier)
            .max()
            .unwrap_or(EscalationTier::None)
    }
}

/// Why the harvest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    TargetReached,
    PatienceExhausted,
    IterationLimit,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::TargetReached => "target reached",
            StopReason::PatienceExhausted => "patience exhausted",
            StopReason::IterationLimit => "iteration limit",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Mutable state of one harvest loop run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestState {
    policy: EscalationPolicy,
    target: usize,
    max_iterations: u32,
    reference_count: usize,
    no_progress: u32,
    tier: EscalationTier,
    iteration: u32,
}

impl HarvestState {
    pub fn new(policy: EscalationPolicy, target: usize, max_iterations: u32) -> Self {
        Self {
            policy,
            target,
            max_iterations,
            reference_count: 0,
            no_progress: 0,
            tier: EscalationTier::None,
            iteration: 0,
        }
    }

    /// Record the outcome of one discovery pass.
    ///
    /// Returns the tier whose recovery action must run now, if the pass
    /// escalated. Tiers only ever increase while no progress is made; any
    /// progress drops back to [`EscalationTier::None`].
    pub fn observe(&mut self, delta: usize, reference_count: usize) -> Option<EscalationTier> {
        self.reference_count = reference_count;
        if delta > 0 {
            self.no_progress = 0;
            self.tier = EscalationTier::None;
            return None;
        }

        self.no_progress = self.no_progress.saturating_add(1);
        let candidate = self.policy.tier_for(self.no_progress);
        if candidate > self.tier {
            self.tier = candidate;
            Some(candidate)
        } else {
            None
        }
    }

    /// Count one load-more trigger.
    pub fn advance(&mut self) {
        self.iteration = self.iteration.saturating_add(1);
    }

    /// The terminal condition that currently holds, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.reference_count >= self.target {
            Some(StopReason::TargetReached)
        } else if self.policy.patience > 0 && self.no_progress >= self.policy.patience {
            Some(StopReason::PatienceExhausted)
        } else if self.iteration >= self.max_iterations {
            Some(StopReason::IterationLimit)
        } else {
            None
        }
    }

    pub fn no_progress(&self) -> u32 {
        self.no_progress
    }

    pub fn tier(&self) -> EscalationTier {
        self.tier
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::{EscalationPolicy, EscalationTier, HarvestState, StopReason};

    #[test]
    fn tier_for_uses_highest_reached_threshold() {
        let policy = EscalationPolicy::default();
        assert_eq!(policy.tier_for(2), EscalationTier::None);
        assert_eq!(policy.tier_for(3), EscalationTier::AlternateControl);
        assert_eq!(policy.tier_for(7), EscalationTier::Reload);
        assert_eq!(policy.tier_for(40), EscalationTier::ZoomOut);
    }

    #[test]
    fn escalation_fires_once_per_tier_in_order() {
        let mut state = HarvestState::new(EscalationPolicy::default(), 10, 50);
        let fired: Vec<_> = (0..12).filter_map(|_| state.observe(0, 0)).collect();
        assert_eq!(
            fired,
            vec![
                EscalationTier::AlternateControl,
                EscalationTier::Reload,
                EscalationTier::ZoomOut
            ]
        );
        assert_eq!(state.stop_reason(), Some(StopReason::PatienceExhausted));
    }

    #[test]
    fn progress_resets_counter_and_tier() {
        let mut state = HarvestState::new(EscalationPolicy::default(), 10, 50);
        for _ in 0..4 {
            state.observe(0, 1);
        }
        assert_eq!(state.tier(), EscalationTier::AlternateControl);

        assert_eq!(state.observe(2, 3), None);
        assert_eq!(state.no_progress(), 0);
        assert_eq!(state.tier(), EscalationTier::None);

        // Escalation starts over from the first tier.
        let fired: Vec<_> = (0..3).filter_map(|_| state.observe(0, 3)).collect();
        assert_eq!(fired, vec![EscalationTier::AlternateControl]);
    }

    #[test]
    fn target_takes_precedence_over_iteration_limit() {
        let mut state = HarvestState::new(EscalationPolicy::default(), 2, 1);
        state.observe(2, 2);
        state.advance();
        assert_eq!(state.stop_reason(), Some(StopReason::TargetReached));
    }

    #[test]
    fn iteration_limit_stops_a_slow_source() {
        let mut state = HarvestState::new(EscalationPolicy::default(), 100, 3);
        for count in 1..=3 {
            state.observe(1, count);
            assert_eq!(state.stop_reason(), None);
            state.advance();
        }
        assert_eq!(state.stop_reason(), Some(StopReason::IterationLimit));
    }
}
