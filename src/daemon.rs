//! Daemon root (`spec.md` §6): wires the config loader, supervisor, signal bridge,
//! control server, and shutdown coordinator together and owns the single event loop
//! that every `Supervisor` mutation runs on.

use crate::cli::DaemonArgs;
use crate::config::loader;
use crate::config::service::ServiceDefinition;
use crate::control::server::{self, ControlRequest};
use crate::control::{Request, Response, ServiceStatusDto};
use crate::event::channel::pub_sub;
use crate::event::{ApplicationEvent, SupervisorEvent};
use crate::identity::ServiceId;
use crate::shutdown::ShutdownCoordinator;
use crate::signal::SignalBridge;
use crate::state_store::{self, PersistedState};
use crate::supervisor::Supervisor;
use crossbeam::channel::Select;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Exit codes (`spec.md` §6): 0 clean, 1 config error, 2 I/O/permissions error,
/// 3 shutdown escalated to the force phase.
pub fn run(args: DaemonArgs) -> ExitCode {
    let data_dir = args.data_dir.unwrap_or_else(state_store::data_dir);
    let socket_path = args.socket.unwrap_or_else(crate::control::default_socket_path);
    let state_path = data_dir.join("state.json");

    let defs = match load_config(&args.config) {
        Ok(defs) => defs,
        Err(code) => return code,
    };

    let state = match PersistedState::load(&state_path) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "failed to load persisted state");
            return ExitCode::from(2);
        }
    };

    let (application_publisher, application_consumer) = pub_sub::<ApplicationEvent>();
    let (health_publisher, health_consumer) = pub_sub::<SupervisorEvent>();
    let (control_publisher, control_consumer) = pub_sub::<ControlRequest>();

    let _signal_bridge = match SignalBridge::install(application_publisher.clone()) {
        Ok(bridge) => bridge,
        Err(err) => {
            error!(error = %err, "failed to install signal handler");
            return ExitCode::from(2);
        }
    };
    #[cfg(unix)]
    if let Err(err) = crate::signal::reload::spawn_watcher(application_publisher) {
        warn!(error = %err, "failed to install SIGHUP watcher, reload-by-signal disabled");
    }

    let control_handle = match server::spawn(socket_path, control_publisher) {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "control socket unavailable, continuing without it");
            None
        }
    };

    let mut supervisor = Supervisor::new(data_dir, state_path, state, health_publisher);
    for (id, result) in supervisor.start(&defs) {
        if let Err(err) = result {
            warn!(service = %id, error = %err, "service failed to start at boot");
        }
    }

    let exit = event_loop(&mut supervisor, &application_consumer, &health_consumer, &control_consumer, &args.config);

    if let Some(handle) = control_handle {
        let _ = handle.signal_stop();
    }

    exit
}

fn load_config(path: &PathBuf) -> Result<Vec<ServiceDefinition>, ExitCode> {
    match loader::load(path) {
        Ok(config) => Ok(config.services),
        Err(err) => {
            error!(error = %err, path = %path.display(), "failed to load config");
            Err(ExitCode::from(1))
        }
    }
}

fn event_loop(
    supervisor: &mut Supervisor,
    application_consumer: &crate::event::channel::EventConsumer<ApplicationEvent>,
    health_consumer: &crate::event::channel::EventConsumer<SupervisorEvent>,
    control_consumer: &crate::event::channel::EventConsumer<ControlRequest>,
    config_path: &PathBuf,
) -> ExitCode {
    loop {
        supervisor.tick();

        let mut select = Select::new();
        let app_idx = select.recv(application_consumer.as_ref());
        let health_idx = select.recv(health_consumer.as_ref());
        let control_idx = select.recv(control_consumer.as_ref());

        let op = select.select_timeout(Duration::from_secs(1));
        let Ok(op) = op else {
            continue;
        };

        match op.index() {
            i if i == app_idx => {
                let Ok(event) = op.recv(application_consumer.as_ref()) else {
                    continue;
                };
                match event {
                    ApplicationEvent::StopRequested => {
                        return shutdown(supervisor, application_consumer);
                    }
                    ApplicationEvent::ReloadRequested => reload(supervisor, config_path),
                }
            }
            i if i == health_idx => {
                let Ok(event) = op.recv(health_consumer.as_ref()) else {
                    continue;
                };
                if let SupervisorEvent::HealthChanged { id, status, epoch_start } = event {
                    supervisor.on_health_change(id, status, epoch_start);
                }
            }
            i if i == control_idx => {
                let Ok(request) = op.recv(control_consumer.as_ref()) else {
                    continue;
                };
                if matches!(request.request, Request::DaemonStop) {
                    let _ = request.reply.send(Response::Ok);
                    return shutdown(supervisor, application_consumer);
                }
                let response = handle_control_request(supervisor, request.request, config_path);
                let _ = request.reply.send(response);
            }
            _ => unreachable!(),
        }
    }
}

fn reload(supervisor: &mut Supervisor, config_path: &PathBuf) {
    match loader::load(config_path) {
        Ok(config) => {
            info!("reloading config");
            supervisor.reconcile(&config.services);
        }
        Err(err) => {
            error!(error = %err, "reload failed, keeping previous config");
        }
    }
}

fn handle_control_request(supervisor: &mut Supervisor, request: Request, config_path: &PathBuf) -> Response {
    match request {
        Request::Status { names } => {
            let services = supervisor
                .status(None)
                .into_iter()
                .filter(|snapshot| names.is_empty() || names.contains(&snapshot.name))
                .map(|snapshot| ServiceStatusDto {
                    id: snapshot.id,
                    name: snapshot.name,
                    pid: snapshot.pid,
                    state: snapshot.state.to_string(),
                    health: snapshot.health,
                    restart_attempt: snapshot.restart_attempt,
                })
                .collect();
            Response::Status { services }
        }
        Request::Stop { names } => {
            let ids = resolve_ids(supervisor, &names);
            supervisor.stop(&ids);
            Response::Ok
        }
        Request::Start { .. } => Response::Error {
            message: "start via control socket requires re-reading config; use reload instead".to_string(),
        },
        Request::Reload => {
            reload(supervisor, config_path);
            Response::Ok
        }
        Request::DaemonStop => unreachable!("handled before dispatch in event_loop"),
        Request::Logs { .. } => Response::Error {
            message: "log tailing is not yet implemented over the control socket".to_string(),
        },
    }
}

fn resolve_ids(supervisor: &Supervisor, names: &[String]) -> Vec<ServiceId> {
    supervisor
        .status(None)
        .into_iter()
        .filter(|snapshot| names.is_empty() || names.contains(&snapshot.name))
        .map(|snapshot| snapshot.id)
        .collect()
}

fn shutdown(
    supervisor: &mut Supervisor,
    application_consumer: &crate::event::channel::EventConsumer<ApplicationEvent>,
) -> ExitCode {
    info!("stop requested, beginning shutdown sequence");
    let mut coordinator = ShutdownCoordinator::new();
    let second_signal = || {
        matches!(
            application_consumer.recv_timeout(Duration::from_millis(0)),
            Ok(ApplicationEvent::StopRequested)
        )
    };
    if coordinator.run(supervisor, second_signal) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(3)
    }
}
