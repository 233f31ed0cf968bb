//! `spec.md` §3 `HealthStatus` state machine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Not enough probe results yet to have an opinion.
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

/// Consecutive-result counter that flips [`HealthStatus`] once it crosses the
/// service's configured `failure_threshold` / `success_threshold` (`spec.md` §3).
#[derive(Debug, Clone, Copy)]
pub struct ThresholdTracker {
    status: HealthStatus,
    consecutive_successes: u32,
    consecutive_failures: u32,
    failure_threshold: u32,
    success_threshold: u32,
}

impl ThresholdTracker {
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_successes: 0,
            consecutive_failures: 0,
            failure_threshold,
            success_threshold,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Feeds one probe result in; returns `Some(new_status)` only on a transition.
    pub fn record(&mut self, success: bool) -> Option<HealthStatus> {
        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes += 1;
            if self.status != HealthStatus::Healthy && self.consecutive_successes >= self.success_threshold {
                self.status = HealthStatus::Healthy;
                return Some(self.status);
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures += 1;
            if self.status != HealthStatus::Unhealthy && self.consecutive_failures >= self.failure_threshold {
                self.status = HealthStatus::Unhealthy;
                return Some(self.status);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_unknown_below_threshold() {
        let mut tracker = ThresholdTracker::new(3, 1);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.record(false), None);
        assert_eq!(tracker.status(), HealthStatus::Unknown);
    }

    #[test]
    fn flips_unhealthy_at_threshold() {
        let mut tracker = ThresholdTracker::new(3, 1);
        tracker.record(false);
        tracker.record(false);
        assert_eq!(tracker.record(false), Some(HealthStatus::Unhealthy));
        assert_eq!(tracker.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn recovers_after_success_threshold() {
        let mut tracker = ThresholdTracker::new(1, 2);
        tracker.record(false);
        assert_eq!(tracker.status(), HealthStatus::Unhealthy);
        assert_eq!(tracker.record(true), None);
        assert_eq!(tracker.record(true), Some(HealthStatus::Healthy));
    }

    #[test]
    fn single_failure_does_not_reset_established_health_below_threshold() {
        let mut tracker = ThresholdTracker::new(3, 1);
        tracker.record(true);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        tracker.record(false);
        tracker.record(false);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        assert_eq!(tracker.record(false), Some(HealthStatus::Unhealthy));
    }
}
