//! Shutdown Coordinator (`spec.md` §4.8): drives the four-phase graceful shutdown
//! sequence once an [`ApplicationEvent::StopRequested`](crate::event::ApplicationEvent)
//! arrives. Each phase has its own deadline; falling through two deadlines (or seeing a
//! second stop signal) jumps straight to Phase 4.

use crate::config::defaults::{SHUTDOWN_CANCEL, SHUTDOWN_DRAIN, SHUTDOWN_FORCE, SHUTDOWN_QUIESCE};
use crate::supervisor::Supervisor;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Stop accepting new `start`/control requests; let in-flight operations finish.
    Quiesce,
    /// Gracefully stop every running service (SIGTERM, wait up to its own grace period).
    Drain,
    /// Cancel any service still not stopped and every background thread (health
    /// monitors, signal watchers) that hasn't acknowledged yet.
    Cancel,
    /// SIGKILL anything left and exit regardless of outcome.
    Force,
}

pub struct ShutdownCoordinator {
    deadline_exceeded_count: u32,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            deadline_exceeded_count: 0,
        }
    }

    /// Runs the full sequence against `supervisor`. `second_signal` reports whether a
    /// repeat stop signal arrived (checked at each phase boundary) — seeing it jumps
    /// straight to Phase 4 (`spec.md` §4.8 "emergency shutdown"). Returns `true` if the
    /// sequence completed cleanly, `false` if it had to escalate to the force phase
    /// (`spec.md` §6 exit code 3).
    pub fn run(&mut self, supervisor: &mut Supervisor, second_signal: impl Fn() -> bool) -> bool {
        info!("shutdown: phase 1 (quiesce)");
        supervisor.begin_draining();
        if !self.wait_or_escalate(SHUTDOWN_QUIESCE, &second_signal, ShutdownPhase::Quiesce) {
            self.force(supervisor);
            return false;
        }

        info!("shutdown: phase 2 (drain)");
        let ids = supervisor.running_ids();
        if !self.run_phase(SHUTDOWN_DRAIN, &second_signal, ShutdownPhase::Drain, || {
            supervisor.stop(&ids);
        }) {
            self.force(supervisor);
            return false;
        }

        info!("shutdown: phase 3 (cancel)");
        if !self.run_phase(SHUTDOWN_CANCEL, &second_signal, ShutdownPhase::Cancel, || {
            supervisor.cancel_all_monitors();
        }) {
            self.force(supervisor);
            return false;
        }

        info!("shutdown complete");
        true
    }

    fn wait_or_escalate(&mut self, deadline: Duration, second_signal: &impl Fn() -> bool, phase: ShutdownPhase) -> bool {
        self.run_phase(deadline, second_signal, phase, || {})
    }

    /// Runs `work`, which is expected to return promptly (the real blocking happens
    /// inside `Supervisor::stop`'s own per-service grace periods); records whether the
    /// phase's own deadline was exceeded and escalates after two such overruns.
    fn run_phase(
        &mut self,
        deadline: Duration,
        second_signal: &impl Fn() -> bool,
        phase: ShutdownPhase,
        work: impl FnOnce(),
    ) -> bool {
        if second_signal() {
            warn!(?phase, "second stop signal observed, escalating to force shutdown");
            return false;
        }

        let start = Instant::now();
        work();
        let elapsed = start.elapsed();

        if elapsed > deadline {
            self.deadline_exceeded_count += 1;
            warn!(?phase, ?elapsed, ?deadline, "phase exceeded its deadline");
            if self.deadline_exceeded_count >= 2 {
                return false;
            }
        }
        true
    }

    fn force(&mut self, supervisor: &mut Supervisor) {
        warn!("shutdown: phase 4 (force)");
        let ids = supervisor.running_ids();
        supervisor.stop(&ids);
        supervisor.cancel_all_monitors();
        std::thread::sleep(SHUTDOWN_FORCE.min(Duration::from_millis(100)));
    }
}

impl std::fmt::Debug for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShutdownPhase::Quiesce => "quiesce",
            ShutdownPhase::Drain => "drain",
            ShutdownPhase::Cancel => "cancel",
            ShutdownPhase::Force => "force",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;
    use crate::state_store::PersistedState;
    use std::path::PathBuf;

    fn supervisor() -> Supervisor {
        let (events_pub, _events_sub) = pub_sub();
        Supervisor::new(PathBuf::from("/tmp"), PathBuf::from("/tmp/state.json"), PersistedState::default(), events_pub)
    }

    #[test]
    fn clean_run_completes_without_forcing() {
        let mut supervisor = supervisor();
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.run(&mut supervisor, || false);
        assert!(supervisor.is_draining());
    }

    #[test]
    fn second_signal_jumps_to_force() {
        let mut supervisor = supervisor();
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.run(&mut supervisor, || true);
        assert!(supervisor.is_draining());
    }
}
