//! Minimal Postgres startup-handshake probe: send a `StartupMessage`, read the
//! server's response stream, and succeed once `ReadyForQuery` ('Z') arrives.
//! A cleartext `PasswordMessage` is sent if the server asks for one ('R' auth
//! request with type 3); any other authentication method is treated as failure
//! since we only carry a plain password.

use super::{Probe, ProbeError};
use crate::config::health_check::HealthCheckConfig;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::health::status::HealthStatus;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const PROTOCOL_VERSION: i32 = 0x0003_0000;

pub struct PostgresProbe;

impl Probe for PostgresProbe {
    fn check(
        &self,
        local_port: u16,
        _context: Option<&str>,
        config: &HealthCheckConfig,
        timeout: Duration,
        _cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError> {
        let HealthCheckConfig::Postgres {
            database,
            user,
            password,
            port,
            ..
        } = config
        else {
            return Err(ProbeError::Protocol("postgres probe given non-postgres config".to_string()));
        };

        let addr: SocketAddr = ([127, 0, 0, 1], local_port).into();
        let deadline = Instant::now() + timeout;

        let mut stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(_) => return Ok(HealthStatus::Unhealthy),
        };
        let _ = port; // probed port is always the forward's local_port
        stream.set_read_timeout(Some(remaining(deadline)))?;
        stream.set_write_timeout(Some(remaining(deadline)))?;

        if stream.write_all(&startup_message(user, database)).is_err() {
            return Ok(HealthStatus::Unhealthy);
        }

        loop {
            if Instant::now() >= deadline {
                return Err(ProbeError::Timeout(timeout));
            }
            let Some((tag, body)) = read_message(&mut stream) else {
                return Ok(HealthStatus::Unhealthy);
            };
            match tag {
                b'Z' => return Ok(HealthStatus::Healthy),
                b'E' => return Ok(HealthStatus::Unhealthy),
                b'R' => {
                    let auth_type = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                    match auth_type {
                        0 => continue,
                        3 => {
                            if stream.write_all(&password_message(password)).is_err() {
                                return Ok(HealthStatus::Unhealthy);
                            }
                        }
                        _ => return Ok(HealthStatus::Unhealthy),
                    }
                }
                _ => continue,
            }
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now()).max(Duration::from_millis(1))
}

fn startup_message(user: &str, database: &str) -> Vec<u8> {
    let mut params = Vec::new();
    params.extend_from_slice(b"user\0");
    params.extend_from_slice(user.as_bytes());
    params.push(0);
    params.extend_from_slice(b"database\0");
    params.extend_from_slice(database.as_bytes());
    params.push(0);
    params.push(0); // terminator

    let mut message = Vec::new();
    message.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    message.extend_from_slice(&params);

    let mut framed = Vec::with_capacity(message.len() + 4);
    framed.extend_from_slice(&((message.len() + 4) as i32).to_be_bytes());
    framed.extend_from_slice(&message);
    framed
}

fn password_message(password: &str) -> Vec<u8> {
    let mut body = password.as_bytes().to_vec();
    body.push(0);

    let mut message = Vec::with_capacity(body.len() + 5);
    message.push(b'p');
    message.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    message.extend_from_slice(&body);
    message
}

/// Reads one backend message `{tag(1), len(4) incl. self, body}`. Returns `None`
/// on any I/O failure, which the caller treats as an unhealthy probe.
fn read_message(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).ok()?;
    let tag = header[0];
    let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len < 4 {
        return None;
    }
    let mut body = vec![0u8; len - 4];
    stream.read_exact(&mut body).ok()?;
    Some((tag, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_message_carries_protocol_version() {
        let message = startup_message("alice", "app");
        let version = i32::from_be_bytes([message[4], message[5], message[6], message[7]]);
        assert_eq!(version, PROTOCOL_VERSION);
    }

    #[test]
    fn password_message_has_p_tag() {
        let message = password_message("hunter2");
        assert_eq!(message[0], b'p');
    }
}
