//! Client side of the control protocol, used by the `localport` CLI binary.

use super::{Request, Response};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ControlClientError {
    #[error("connecting to daemon at `{0}`: {1} (is the daemon running?)")]
    Connect(String, std::io::Error),
    #[error("writing request: {0}")]
    Write(std::io::Error),
    #[error("reading response: {0}")]
    Read(std::io::Error),
    #[error("daemon closed the connection without responding")]
    EmptyResponse,
    #[error("parsing response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Sends one request and waits for the matching response. Each call opens a fresh
/// connection — the control protocol is request/response, not a persistent session.
pub fn send(socket_path: &Path, request: &Request) -> Result<Response, ControlClientError> {
    let stream = UnixStream::connect(socket_path)
        .map_err(|err| ControlClientError::Connect(socket_path.display().to_string(), err))?;
    let mut writer = stream.try_clone().map_err(ControlClientError::Write)?;
    let mut reader = BufReader::new(stream);

    let body = serde_json::to_string(request)?;
    writeln!(writer, "{body}").map_err(ControlClientError::Write)?;

    let mut line = String::new();
    if reader.read_line(&mut line).map_err(ControlClientError::Read)? == 0 {
        return Err(ControlClientError::EmptyResponse);
    }

    Ok(serde_json::from_str(line.trim_end())?)
}
