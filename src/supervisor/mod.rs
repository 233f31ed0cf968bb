//! Supervisor / Service Manager (`spec.md` §4.1) — the central control plane.
//! Owned exclusively by the daemon's single event-loop thread: every public
//! method takes `&mut self`, so the per-service total-ordering invariant (`spec.md`
//! §5) falls out of there being exactly one caller, not from internal locking.

pub mod reconcile;
pub mod table;

use crate::adapters::{self, shutdown as adapter_shutdown, AdapterError};
use crate::config::defaults::DEFAULT_GRACE_PERIOD_MS;
use crate::config::service::ServiceDefinition;
use crate::event::channel::EventPublisher;
use crate::event::SupervisorEvent;
use crate::health::monitor;
use crate::health::status::HealthStatus;
use crate::identity::ServiceId;
use crate::logs::service_log_path;
use crate::restart::{RestartDecision, RestartManager};
use crate::state_store::{PersistedEntry, PersistedState, StateStoreError};
use crate::utils::thread_context::StartedThreadContext;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use table::{RunningService, ServiceSnapshot, ServiceState};
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("service `{0}` is already running")]
    AlreadyRunning(String),
    #[error("daemon is shutting down, refusing to start `{0}`")]
    Draining(String),
    #[error("local port {port} is already in use by pid {pid}, which localport did not start")]
    ExternalPortConflict { port: u16, pid: u32 },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

pub struct Supervisor {
    services: HashMap<ServiceId, RunningService>,
    definitions: HashMap<ServiceId, ServiceDefinition>,
    monitors: HashMap<ServiceId, StartedThreadContext>,
    restart_manager: RestartManager,
    state: PersistedState,
    state_path: PathBuf,
    data_dir: PathBuf,
    health_events: EventPublisher<SupervisorEvent>,
    draining: bool,
}

impl Supervisor {
    pub fn new(data_dir: PathBuf, state_path: PathBuf, state: PersistedState, health_events: EventPublisher<SupervisorEvent>) -> Self {
        Self {
            services: HashMap::new(),
            definitions: HashMap::new(),
            monitors: HashMap::new(),
            restart_manager: RestartManager::new(),
            state,
            state_path,
            data_dir,
            health_events,
            draining: false,
        }
    }

    /// Refuses new starts once Phase 1 of shutdown begins (`spec.md` §4.8).
    pub fn begin_draining(&mut self) {
        self.draining = true;
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn status(&self, ids: Option<&[ServiceId]>) -> Vec<ServiceSnapshot> {
        self.services
            .values()
            .filter(|svc| ids.is_none_or(|ids| ids.contains(&svc.id)))
            .map(ServiceSnapshot::from)
            .collect()
    }

    pub fn start(&mut self, defs: &[ServiceDefinition]) -> Vec<(ServiceId, Result<(), StartError>)> {
        defs.iter().map(|def| (ServiceId::from_definition(def), self.start_one(def))).collect()
    }

    fn start_one(&mut self, def: &ServiceDefinition) -> Result<(), StartError> {
        let id = ServiceId::from_definition(def);

        if self.draining {
            return Err(StartError::Draining(def.name.clone()));
        }
        if self.services.contains_key(&id) {
            return Ok(()); // idempotent per spec.md §8 property 7
        }

        if let Some(running) = self.try_adopt(def, id) {
            let pid = running.pid;
            let epoch_start = running.epoch_start;
            self.services.insert(id, running);
            self.definitions.insert(id, def.clone());

            let context = kubernetes_context(def);
            let monitor = monitor::spawn(id, def.local_port, context, def.health_check.clone(), epoch_start, self.health_events.clone());
            self.monitors.insert(id, monitor);

            info!(service = %id, name = %def.name, pid, "adopted still-running service from a previous daemon instance");
            return Ok(());
        }

        if let Some(conflict) = external_port_holder(def.local_port, &self.state) {
            return Err(StartError::ExternalPortConflict {
                port: def.local_port,
                pid: conflict,
            });
        }

        let log_path = service_log_path(&self.data_dir, &def.name, id);
        let spawned = adapters::spawn(def, &log_path)?;
        let epoch_start = SystemTime::now();

        let mut running = RunningService::new(id, def.name.clone(), spawned.pid, epoch_start, log_path);
        running.state = ServiceState::Running;
        self.services.insert(id, running);
        self.definitions.insert(id, def.clone());

        self.state.upsert(PersistedEntry {
            service_id: id,
            pid: spawned.pid,
            technology: def.technology,
            local_port: def.local_port,
            started_at: epoch_start,
            command_argv_fingerprint: spawned.argv_fingerprint.clone(),
        });
        self.persist_state();

        let context = kubernetes_context(def);
        let monitor = monitor::spawn(
            id,
            def.local_port,
            context,
            def.health_check.clone(),
            epoch_start,
            self.health_events.clone(),
        );
        self.monitors.insert(id, monitor);

        info!(service = %id, name = %def.name, pid = spawned.pid, "service started");
        Ok(())
    }

    /// Boot-time reconciliation (`spec.md` §4.8): if `PersistedState` has an entry for
    /// `id` whose PID is still alive and whose recorded argv fingerprint matches what
    /// `def` would launch today, re-attach a health monitor to it instead of spawning a
    /// second forwarder on the same port. A stale entry (dead PID, or a fingerprint that
    /// no longer matches because the config changed underneath it) is discarded and the
    /// caller falls through to a normal spawn.
    fn try_adopt(&mut self, def: &ServiceDefinition, id: ServiceId) -> Option<RunningService> {
        let entry = self.state.get(id)?.clone();
        if !process_alive(entry.pid) {
            self.state.remove(id);
            return None;
        }
        match adapters::expected_argv_fingerprint(def) {
            Ok(expected) if expected == entry.command_argv_fingerprint => {}
            _ => {
                self.state.remove(id);
                return None;
            }
        }

        let log_path = service_log_path(&self.data_dir, &def.name, id);
        let mut running = RunningService::new(id, def.name.clone(), entry.pid, entry.started_at, log_path);
        running.state = ServiceState::Running;
        Some(running)
    }

    pub fn stop(&mut self, ids: &[ServiceId]) {
        for id in ids {
            self.stop_one(*id);
        }
    }

    fn stop_one(&mut self, id: ServiceId) {
        let Some(service) = self.services.get_mut(&id) else {
            return; // idempotent per spec.md §8 property 8
        };
        service.state = ServiceState::Stopping;
        let pid = service.pid;

        if let Some(monitor) = self.monitors.remove(&id) {
            let _ = monitor.signal_stop();
        }

        let grace = Duration::from_millis(DEFAULT_GRACE_PERIOD_MS);
        if let Err(err) = adapter_shutdown::terminate_with_grace(pid, grace, || process_alive(pid)) {
            warn!(service = %id, error = %err, "error terminating child");
        }

        self.services.remove(&id);
        self.definitions.remove(&id);
        self.restart_manager.forget(id);
        self.state.remove(id);
        self.persist_state();

        info!(service = %id, "service stopped");
    }

    /// `spec.md` §4.1 `on_health_change`. Stale callbacks (wrong epoch) are dropped.
    pub fn on_health_change(&mut self, id: ServiceId, status: HealthStatus, epoch_start: SystemTime) {
        let Some(service) = self.services.get_mut(&id) else {
            return;
        };
        if service.epoch_start != epoch_start {
            return; // late callback from a superseded epoch
        }

        match status {
            HealthStatus::Healthy => {
                service.health = HealthStatus::Healthy;
                service.consecutive_failures = 0;
                if service.state == ServiceState::Unhealthy || service.state == ServiceState::Starting {
                    service.state = ServiceState::Running;
                }
                self.restart_manager.mark_healthy(id, Instant::now());
            }
            HealthStatus::Unhealthy => {
                service.health = HealthStatus::Unhealthy;
                service.state = ServiceState::Unhealthy;
                self.handle_unhealthy(id);
            }
            HealthStatus::Unknown => {}
        }
    }

    /// Decides whether `id` gets another attempt and, if so, terminates the failing
    /// child right away but *schedules* the replacement for `delay` from now
    /// (`spec.md` §4.1 "schedule restart after backoff delay", §4.6) rather than
    /// respawning inline — [`Self::tick`] drives the actual respawn once the delay has
    /// elapsed.
    fn handle_unhealthy(&mut self, id: ServiceId) {
        let Some(def) = self.definitions.get(&id).cloned() else {
            return;
        };
        match self.restart_manager.should_restart(id, &def.restart_policy) {
            RestartDecision::Restart { attempt, delay } => {
                if let Some(monitor) = self.monitors.remove(&id) {
                    let _ = monitor.signal_stop();
                }
                if let Some(service) = self.services.get_mut(&id) {
                    let pid = service.pid;
                    service.state = ServiceState::Restarting;
                    service.restart_attempt = attempt;
                    service.next_retry_at = Some(SystemTime::now() + delay);

                    let grace = Duration::from_millis(DEFAULT_GRACE_PERIOD_MS);
                    if let Err(err) = adapter_shutdown::terminate_with_grace(pid, grace, || process_alive(pid)) {
                        warn!(service = %id, error = %err, "error terminating unhealthy child");
                    }
                }
                info!(service = %id, attempt, ?delay, "service unhealthy, restart scheduled after backoff delay");
            }
            RestartDecision::GiveUp => {
                if let Some(service) = self.services.get_mut(&id) {
                    service.state = ServiceState::Failed;
                }
                warn!(service = %id, "restart policy exhausted, service marked failed");
            }
        }
    }

    /// Periodic upkeep (`spec.md` §4.6): meant to be called once per daemon event-loop
    /// tick. Respawns services whose scheduled backoff delay has elapsed and decays
    /// restart-attempt counters for services that have stayed healthy long enough.
    pub fn tick(&mut self) {
        self.process_due_restarts();

        let now = Instant::now();
        for (id, def) in &self.definitions {
            self.restart_manager.maybe_reset(*id, &def.restart_policy, now);
        }
    }

    fn process_due_restarts(&mut self) {
        let now = SystemTime::now();
        let due: Vec<ServiceId> = self
            .services
            .iter()
            .filter(|(_, svc)| svc.state == ServiceState::Restarting && svc.next_retry_at.is_some_and(|retry_at| retry_at <= now))
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            if let Some(def) = self.definitions.get(&id).cloned() {
                self.restart_child(id, &def);
            }
        }
    }

    /// Respawns `id`'s forwarder. The failing child was already terminated by
    /// [`Self::handle_unhealthy`]; this only spawns the replacement and re-attaches a
    /// health monitor for the new epoch.
    fn restart_child(&mut self, id: ServiceId, def: &ServiceDefinition) {
        if let Some(monitor) = self.monitors.remove(&id) {
            let _ = monitor.signal_stop();
        }

        let id_for_log = id;
        match adapters::spawn(def, &service_log_path(&self.data_dir, &def.name, id)) {
            Ok(spawned) => {
                let epoch_start = SystemTime::now();
                if let Some(service) = self.services.get_mut(&id) {
                    service.pid = spawned.pid;
                    service.epoch_start = epoch_start;
                    service.state = ServiceState::Running;
                    service.consecutive_failures = 0;
                    service.next_retry_at = None;
                }
                self.state.upsert(PersistedEntry {
                    service_id: id,
                    pid: spawned.pid,
                    technology: def.technology,
                    local_port: def.local_port,
                    started_at: epoch_start,
                    command_argv_fingerprint: spawned.argv_fingerprint.clone(),
                });
                self.persist_state();

                let context = kubernetes_context(def);
                let monitor = monitor::spawn(
                    id,
                    def.local_port,
                    context,
                    def.health_check.clone(),
                    epoch_start,
                    self.health_events.clone(),
                );
                self.monitors.insert(id, monitor);
            }
            Err(err) => {
                error!(service = %id_for_log, error = %err, "restart spawn failed");
                if let Some(service) = self.services.get_mut(&id) {
                    service.state = ServiceState::Failed;
                }
            }
        }
    }

    fn persist_state(&self) {
        use crate::fs::LocalFile;
        if let Err(err) = self.state.save(&LocalFile, &LocalFile, &self.state_path) {
            error!(error = %err, "failed to persist state");
        }
    }

    pub fn load_state(state_path: &PathBuf) -> Result<PersistedState, StateStoreError> {
        PersistedState::load(state_path)
    }

    /// Signals every monitor to stop without waiting — used by shutdown Phase 3.
    pub fn cancel_all_monitors(&mut self) {
        for (_, monitor) in self.monitors.drain() {
            let _ = monitor.signal_stop();
        }
    }

    pub fn running_ids(&self) -> Vec<ServiceId> {
        self.services.keys().copied().collect()
    }

    /// Applies a config reload (`spec.md` §4.1, §4.8): stops removed/changed-identity
    /// services, starts new ones, and patches tuning-only changes in place without
    /// restarting the forwarder.
    pub fn reconcile(&mut self, desired: &[ServiceDefinition]) {
        let plan = reconcile::plan(desired, &self.definitions);
        for action in plan {
            match action {
                reconcile::ReconcileAction::Stop(id) => self.stop_one(id),
                reconcile::ReconcileAction::Start(def) => {
                    if let Err(err) = self.start_one(&def) {
                        error!(name = %def.name, error = %err, "reconcile start failed");
                    }
                }
                reconcile::ReconcileAction::Update(def) => {
                    let id = ServiceId::from_definition(&def);
                    self.definitions.insert(id, def);
                }
            }
        }
    }
}

fn kubernetes_context(def: &ServiceDefinition) -> Option<String> {
    match &def.connection {
        crate::config::service::ConnectionSpec::Kubernetes { context, .. } => context.clone(),
        crate::config::service::ConnectionSpec::Ssh { .. } => None,
    }
}

/// Returns the PID of a process already listening on `local_port` that isn't the one
/// `state` has recorded as ours (`spec.md` §4.1 "refuse if local port is in use by a
/// process not in our persisted state", §7, Scenario G).
#[cfg(target_os = "linux")]
fn external_port_holder(local_port: u16, state: &PersistedState) -> Option<u32> {
    let inode = proc_net::find_listening_inode(local_port)?;
    let holder_pid = proc_net::find_pid_for_inode(inode)?;

    let our_pid = state.entries.values().find(|entry| entry.local_port == local_port).map(|entry| entry.pid);
    if our_pid == Some(holder_pid) {
        return None;
    }
    Some(holder_pid)
}

#[cfg(not(target_os = "linux"))]
fn external_port_holder(_local_port: u16, _state: &PersistedState) -> Option<u32> {
    None
}

/// `/proc`-based port-to-PID lookup, the same technique `ss`/`lsof` use: match the
/// target port against a LISTEN row in `/proc/net/tcp{,6}` to get a socket inode, then
/// scan every process's `/proc/<pid>/fd` for a `socket:[<inode>]` symlink.
#[cfg(target_os = "linux")]
mod proc_net {
    pub fn find_listening_inode(local_port: u16) -> Option<u64> {
        let port_hex = format!("{local_port:04X}");
        for path in ["/proc/net/tcp", "/proc/net/tcp6"] {
            let Ok(contents) = std::fs::read_to_string(path) else {
                continue;
            };
            for line in contents.lines().skip(1) {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 10 {
                    continue;
                }
                let Some((_, line_port_hex)) = fields[1].split_once(':') else {
                    continue;
                };
                const TCP_LISTEN: &str = "0A";
                if line_port_hex.eq_ignore_ascii_case(&port_hex) && fields[3].eq_ignore_ascii_case(TCP_LISTEN) {
                    if let Ok(inode) = fields[9].parse() {
                        return Some(inode);
                    }
                }
            }
        }
        None
    }

    pub fn find_pid_for_inode(inode: u64) -> Option<u32> {
        let needle = format!("socket:[{inode}]");
        let proc_dir = std::fs::read_dir("/proc").ok()?;
        for entry in proc_dir.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            for fd in fds.flatten() {
                if let Ok(target) = std::fs::read_link(fd.path()) {
                    if target.to_string_lossy() == needle {
                        return Some(pid);
                    }
                }
            }
        }
        None
    }
}

fn process_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::{ConnectionSpec, Technology};
    use crate::event::channel::pub_sub;

    fn def(name: &str, local_port: u16) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            technology: Technology::Ssh,
            local_port,
            remote_port: 22,
            connection: ConnectionSpec::Ssh {
                host: "example.com".to_string(),
                port: None,
                user: None,
                identity_file: None,
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: HealthCheckSpec::default(),
            restart_policy: RestartPolicyConfig::default(),
        }
    }

    fn supervisor(dir: &std::path::Path) -> Supervisor {
        let (events_pub, _events_sub) = pub_sub();
        Supervisor::new(dir.to_path_buf(), dir.join("state.json"), PersistedState::default(), events_pub)
    }

    #[test]
    fn start_fails_with_missing_binary_as_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let results = supervisor.start(&[def("web", 18080)]);
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());
    }

    #[test]
    fn stop_on_unknown_id_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let fake_id = ServiceId::from_definition(&def("ghost", 1));
        supervisor.stop(&[fake_id]);
        assert!(supervisor.status(None).is_empty());
    }

    #[test]
    fn draining_refuses_new_starts() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        supervisor.begin_draining();
        let results = supervisor.start(&[def("web", 18081)]);
        assert!(matches!(results[0].1, Err(StartError::Draining(_))));
    }

    #[test]
    fn reconcile_removes_service_absent_from_desired_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let service_def = def("web", 18082);
        let id = ServiceId::from_definition(&service_def);
        supervisor.definitions.insert(id, service_def.clone());
        supervisor
            .services
            .insert(id, RunningService::new(id, service_def.name.clone(), 999_999, SystemTime::now(), dir.path().join("web.log")));

        supervisor.reconcile(&[]);
        assert!(!supervisor.definitions.contains_key(&id));
        assert!(supervisor.status(None).is_empty());
    }

    #[test]
    fn try_adopt_reuses_pid_when_fingerprint_matches_and_process_alive() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let service_def = def("web", 18083);
        let id = ServiceId::from_definition(&service_def);
        let fingerprint = adapters::expected_argv_fingerprint(&service_def).unwrap();
        supervisor.state.upsert(PersistedEntry {
            service_id: id,
            pid: std::process::id(),
            technology: service_def.technology,
            local_port: service_def.local_port,
            started_at: SystemTime::now(),
            command_argv_fingerprint: fingerprint,
        });

        let adopted = supervisor.try_adopt(&service_def, id).expect("should adopt still-running process");
        assert_eq!(adopted.pid, std::process::id());
        assert_eq!(adopted.state, ServiceState::Running);
    }

    #[test]
    fn try_adopt_discards_entry_with_mismatched_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let service_def = def("web", 18084);
        let id = ServiceId::from_definition(&service_def);
        supervisor.state.upsert(PersistedEntry {
            service_id: id,
            pid: std::process::id(),
            technology: service_def.technology,
            local_port: service_def.local_port,
            started_at: SystemTime::now(),
            command_argv_fingerprint: "stale".to_string(),
        });

        assert!(supervisor.try_adopt(&service_def, id).is_none());
        assert!(supervisor.state.get(id).is_none());
    }

    #[test]
    fn try_adopt_discards_entry_with_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = supervisor(dir.path());
        let service_def = def("web", 18085);
        let id = ServiceId::from_definition(&service_def);
        supervisor.state.upsert(PersistedEntry {
            service_id: id,
            pid: 999_999,
            technology: service_def.technology,
            local_port: service_def.local_port,
            started_at: SystemTime::now(),
            command_argv_fingerprint: "whatever".to_string(),
        });

        assert!(supervisor.try_adopt(&service_def, id).is_none());
        assert!(supervisor.state.get(id).is_none());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn finds_own_pid_for_a_port_this_process_is_listening_on() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let inode = proc_net::find_listening_inode(port).expect("should find the bound socket's inode");
        let pid = proc_net::find_pid_for_inode(inode).expect("should find the owning pid");
        assert_eq!(pid, std::process::id());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn external_port_holder_ignores_the_pid_recorded_as_ours() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut state = PersistedState::default();
        state.upsert(PersistedEntry {
            service_id: ServiceId::from_definition(&def("web", port)),
            pid: std::process::id(),
            technology: Technology::Ssh,
            local_port: port,
            started_at: SystemTime::now(),
            command_argv_fingerprint: "whatever".to_string(),
        });

        assert!(external_port_holder(port, &state).is_none());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn external_port_holder_reports_a_pid_not_recorded_as_ours() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = PersistedState::default();
        assert_eq!(external_port_holder(port, &state), Some(std::process::id()));
    }
}
