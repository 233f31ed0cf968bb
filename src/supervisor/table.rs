//! Live service table (`spec.md` §3 `RunningService`, `ServiceState`).

use crate::identity::ServiceId;
use crate::health::status::HealthStatus;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Starting,
    Running,
    Unhealthy,
    Restarting,
    Stopping,
    Stopped,
    Failed,
}

impl ServiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Unhealthy => "unhealthy",
            ServiceState::Restarting => "restarting",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct RunningService {
    pub id: ServiceId,
    pub name: String,
    pub pid: u32,
    pub epoch_start: SystemTime,
    pub state: ServiceState,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub restart_attempt: u32,
    pub next_retry_at: Option<SystemTime>,
    pub service_log_path: PathBuf,
}

impl RunningService {
    pub fn new(id: ServiceId, name: String, pid: u32, epoch_start: SystemTime, service_log_path: PathBuf) -> Self {
        Self {
            id,
            name,
            pid,
            epoch_start,
            state: ServiceState::Starting,
            health: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            restart_attempt: 0,
            next_retry_at: None,
            service_log_path,
        }
    }
}

/// Read-only point-in-time view handed out by `status()` (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub id: ServiceId,
    pub name: String,
    pub pid: u32,
    pub state: ServiceState,
    pub health: HealthStatus,
    pub restart_attempt: u32,
}

impl From<&RunningService> for ServiceSnapshot {
    fn from(service: &RunningService) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            pid: service.pid,
            state: service.state,
            health: service.health,
            restart_attempt: service.restart_attempt,
        }
    }
}
