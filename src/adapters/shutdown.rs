//! Graceful-then-forceful termination of an adapter's child (`spec.md` §4.2).
//! Signals the whole process group, since the Kubernetes/SSH forwarder may itself
//! shell out to a helper process.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TerminateError {
    #[error("signalling pid {0}: {1}")]
    Signal(i32, nix::Error),
}

/// `kill(-pid, SIGTERM)` addresses the process group, since children are started
/// in their own session (`spec.md` §4.2 "new session/process group").
pub fn graceful_stop(pid: u32) -> Result<(), TerminateError> {
    signal::kill(Pid::from_raw(-(pid as i32)), Signal::SIGTERM)
        .map_err(|err| TerminateError::Signal(pid as i32, err))
}

pub fn force_stop(pid: u32) -> Result<(), TerminateError> {
    signal::kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL)
        .map_err(|err| TerminateError::Signal(pid as i32, err))
}

/// Sends SIGTERM, polls `still_alive` until it reports the process gone or
/// `grace_period` elapses, then escalates to SIGKILL. `still_alive` is injected so
/// the supervisor can reap the child via its own `waitpid` bookkeeping.
pub fn terminate_with_grace(
    pid: u32,
    grace_period: Duration,
    mut still_alive: impl FnMut() -> bool,
) -> Result<(), TerminateError> {
    graceful_stop(pid)?;

    let deadline = Instant::now() + grace_period;
    while Instant::now() < deadline {
        if !still_alive() {
            debug!(pid, "child exited after graceful stop");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    warn!(pid, "child survived grace period, sending SIGKILL");
    force_stop(pid)
}
