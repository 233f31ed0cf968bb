//! Server side of the control protocol. Runs on its own cooperative thread (the same
//! `NotStartedThreadContext`/stop-channel primitive the health monitors use) and forwards
//! each parsed [`Request`] to the daemon's single event-loop thread via a request/reply
//! channel — the control server itself never touches the `Supervisor`.

use super::Request;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{EventConsumer, EventPublisher};
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};
use crossbeam::channel::Sender;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::Response;

/// One inbound request plus the channel the server thread is blocked on for the reply.
pub struct ControlRequest {
    pub request: Request,
    pub reply: Sender<Response>,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlServerError {
    #[error("binding control socket `{0}`: {1}")]
    Bind(String, std::io::Error),
}

/// Binds `socket_path` (removing a stale file left by an unclean previous shutdown)
/// and spawns the accept-loop thread.
pub fn spawn(
    socket_path: PathBuf,
    requests: EventPublisher<ControlRequest>,
) -> Result<StartedThreadContext, ControlServerError> {
    if let Some(parent) = socket_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    let listener = UnixListener::bind(&socket_path)
        .map_err(|err| ControlServerError::Bind(socket_path.display().to_string(), err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| ControlServerError::Bind(socket_path.display().to_string(), err))?;

    let callback = move |stop_consumer: EventConsumer<CancellationMessage>| {
        accept_loop(listener, &socket_path, &requests, &stop_consumer);
    };

    Ok(NotStartedThreadContext::new("control-server", callback).start())
}

fn accept_loop(
    listener: UnixListener,
    socket_path: &Path,
    requests: &EventPublisher<ControlRequest>,
    stop_consumer: &EventConsumer<CancellationMessage>,
) {
    loop {
        if stop_consumer.is_cancelled(Duration::from_millis(0)) {
            let _ = std::fs::remove_file(socket_path);
            return;
        }

        match listener.accept() {
            Ok((stream, _addr)) => handle_connection(stream, requests),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if stop_consumer.is_cancelled(Duration::from_millis(200)) {
                    let _ = std::fs::remove_file(socket_path);
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "control socket accept failed");
            }
        }
    }
}

fn handle_connection(stream: UnixStream, requests: &EventPublisher<ControlRequest>) {
    let mut reader = BufReader::new(stream.try_clone().expect("cloning control connection"));
    let mut writer = stream;

    let mut line = String::new();
    if reader.read_line(&mut line).unwrap_or(0) == 0 {
        return;
    }

    let response = match serde_json::from_str::<Request>(line.trim_end()) {
        Ok(request) => dispatch(request, requests),
        Err(err) => Response::Error {
            message: format!("malformed request: {err}"),
        },
    };

    if let Ok(body) = serde_json::to_string(&response) {
        if let Err(err) = writeln!(writer, "{body}") {
            debug!(error = %err, "writing control response failed");
        }
    }
}

fn dispatch(request: Request, requests: &EventPublisher<ControlRequest>) -> Response {
    let (reply_tx, reply_rx) = crossbeam::channel::bounded(1);
    if requests
        .publish(ControlRequest {
            request,
            reply: reply_tx,
        })
        .is_err()
    {
        return Response::Error {
            message: "daemon event loop is not accepting requests".to_string(),
        };
    }

    reply_rx
        .recv_timeout(Duration::from_secs(10))
        .unwrap_or(Response::Error {
            message: "timed out waiting for daemon to respond".to_string(),
        })
}
