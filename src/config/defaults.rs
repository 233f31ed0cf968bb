//! Shared default constants, grounded on `spec.md`'s explicit defaults.

use std::time::Duration;

pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5000;

pub const DEFAULT_HEALTH_INTERVAL_S: f64 = 10.0;
pub const DEFAULT_HEALTH_TIMEOUT_S: f64 = 5.0;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;

pub const DEFAULT_RESTART_ENABLED: bool = true;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 0;
pub const DEFAULT_INITIAL_DELAY_S: f64 = 1.0;
pub const DEFAULT_MAX_DELAY_S: f64 = 60.0;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

pub const LOG_ROTATION_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_RETENTION: Duration = Duration::from_secs(3 * 24 * 3600);
pub const LOG_RETENTION_COUNT: usize = 10;

pub const SHUTDOWN_QUIESCE: Duration = Duration::from_secs(2);
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(8);
pub const SHUTDOWN_CANCEL: Duration = Duration::from_secs(15);
pub const SHUTDOWN_FORCE: Duration = Duration::from_secs(5);
