use crate::config::defaults::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_S, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_S,
    DEFAULT_RESTART_ENABLED,
};
use serde::Deserialize;

/// `spec.md` §3 `RestartPolicy`. Delay at attempt `n` is
/// `min(initial_delay * multiplier^(n-1), max_delay)`; `max_attempts == 0` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RestartPolicyConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_s: f64,
    pub max_delay_s: f64,
    pub backoff_multiplier: f64,
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_RESTART_ENABLED,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_s: DEFAULT_INITIAL_DELAY_S,
            max_delay_s: DEFAULT_MAX_DELAY_S,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestartPolicyError {
    #[error("initial_delay_s must be > 0, got {0}")]
    NonPositiveInitialDelay(f64),
    #[error("max_delay_s ({0}) must be >= initial_delay_s ({1})")]
    MaxDelayBelowInitial(f64, f64),
    #[error("backoff_multiplier must be >= 1.0, got {0}")]
    MultiplierBelowOne(f64),
}

impl RestartPolicyConfig {
    pub fn validate(&self) -> Result<(), RestartPolicyError> {
        if self.initial_delay_s <= 0.0 {
            return Err(RestartPolicyError::NonPositiveInitialDelay(
                self.initial_delay_s,
            ));
        }
        if self.max_delay_s < self.initial_delay_s {
            return Err(RestartPolicyError::MaxDelayBelowInitial(
                self.max_delay_s,
                self.initial_delay_s,
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(RestartPolicyError::MultiplierBelowOne(
                self.backoff_multiplier,
            ));
        }
        Ok(())
    }
}
