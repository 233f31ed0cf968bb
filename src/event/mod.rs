pub mod cancellation;
pub mod channel;

use crate::health::status::HealthStatus;
use crate::identity::ServiceId;
use std::time::SystemTime;

/// Internal events flowing from a service's supervising thread (process watcher,
/// health monitor) back to the supervisor's single control loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// The health monitor observed a threshold-crossing transition for `id`.
    HealthChanged {
        id: ServiceId,
        status: HealthStatus,
        epoch_start: SystemTime,
    },
    /// The child process for `id` exited on its own (not via `stop()`).
    ProcessExited {
        id: ServiceId,
        epoch_start: SystemTime,
        exit_code: i32,
    },
}

/// Events raised by the signal bridge and delivered to the daemon's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEvent {
    /// SIGTERM / SIGINT / Ctrl-C.
    StopRequested,
    /// SIGHUP or an explicit `reload()` control request.
    ReloadRequested,
}
