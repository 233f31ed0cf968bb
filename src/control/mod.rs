//! Control surface (`spec.md` §6): a Unix-domain-socket protocol for `start`/`stop`/
//! `status`/`reload`/`daemon_stop`/`logs`, shared by the daemon (server side) and the
//! `localport` CLI (client side). Request/response are newline-delimited JSON — simple
//! enough to debug with `socat`/`nc`, which matters more here than a binary framing
//! would save.

pub mod client;
pub mod server;

use crate::health::status::HealthStatus;
use crate::identity::ServiceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Start { names: Vec<String> },
    Stop { names: Vec<String> },
    Status { names: Vec<String> },
    Reload,
    DaemonStop,
    Logs { name: String, lines: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusDto {
    pub id: ServiceId,
    pub name: String,
    pub pid: u32,
    pub state: String,
    pub health: HealthStatus,
    pub restart_attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Status { services: Vec<ServiceStatusDto> },
    Logs { lines: Vec<String> },
    Error { message: String },
}

/// Default control socket path: `$XDG_RUNTIME_DIR/localport/control.sock`, falling back
/// to the data dir when `XDG_RUNTIME_DIR` isn't set (e.g. under a test harness).
pub fn default_socket_path() -> std::path::PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(crate::state_store::data_dir)
        .join("localport")
        .join("control.sock")
}
