//! Minimal Kafka wire-protocol probe: send a `Metadata` request (API key 3, v0)
//! with an empty topic list and check that at least one broker is returned.

use super::{Probe, ProbeError};
use crate::config::health_check::HealthCheckConfig;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::health::status::HealthStatus;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const API_KEY_METADATA: i16 = 3;
const API_VERSION: i16 = 0;
const CLIENT_ID: &str = "localport-probe";

pub struct KafkaProbe;

impl Probe for KafkaProbe {
    fn check(
        &self,
        local_port: u16,
        _context: Option<&str>,
        config: &HealthCheckConfig,
        timeout: Duration,
        _cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError> {
        if !matches!(config, HealthCheckConfig::Kafka { .. }) {
            return Err(ProbeError::Protocol("kafka probe given non-kafka config".to_string()));
        }

        let addr: SocketAddr = ([127, 0, 0, 1], local_port).into();
        let deadline = Instant::now() + timeout;

        let mut stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(_) => return Ok(HealthStatus::Unhealthy),
        };
        stream.set_read_timeout(Some(remaining(deadline)))?;
        stream.set_write_timeout(Some(remaining(deadline)))?;

        let request = metadata_request();
        if stream.write_all(&request).is_err() {
            return Ok(HealthStatus::Unhealthy);
        }

        let mut size_buf = [0u8; 4];
        if stream.read_exact(&mut size_buf).is_err() {
            return Ok(HealthStatus::Unhealthy);
        }
        let size = i32::from_be_bytes(size_buf) as usize;
        if size == 0 || size > 1024 * 1024 {
            return Ok(HealthStatus::Unhealthy);
        }

        let mut body = vec![0u8; size];
        if stream.read_exact(&mut body).is_err() {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(parse_broker_count(&body))
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now()).max(Duration::from_millis(1))
}

fn metadata_request() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&API_KEY_METADATA.to_be_bytes());
    body.extend_from_slice(&API_VERSION.to_be_bytes());
    body.extend_from_slice(&0i32.to_be_bytes()); // correlation_id
    body.extend_from_slice(&(CLIENT_ID.len() as i16).to_be_bytes());
    body.extend_from_slice(CLIENT_ID.as_bytes());
    body.extend_from_slice(&(-1i32).to_be_bytes()); // null topics array = all topics

    let mut request = Vec::with_capacity(body.len() + 4);
    request.extend_from_slice(&(body.len() as i32).to_be_bytes());
    request.extend_from_slice(&body);
    request
}

/// `correlation_id(4) + broker_array_len(4) + ...`. We only need the count.
fn parse_broker_count(body: &[u8]) -> HealthStatus {
    if body.len() < 8 {
        return HealthStatus::Unhealthy;
    }
    let broker_count = i32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    if broker_count > 0 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_starts_with_metadata_api_key() {
        let request = metadata_request();
        // size(4) then api_key(2) == 3
        assert_eq!(i16::from_be_bytes([request[4], request[5]]), API_KEY_METADATA);
    }

    #[test]
    fn zero_brokers_is_unhealthy() {
        let mut body = vec![0u8; 8];
        body[4..8].copy_from_slice(&0i32.to_be_bytes());
        assert_eq!(parse_broker_count(&body), HealthStatus::Unhealthy);
    }

    #[test]
    fn nonzero_brokers_is_healthy() {
        let mut body = vec![0u8; 8];
        body[4..8].copy_from_slice(&2i32.to_be_bytes());
        assert_eq!(parse_broker_count(&body), HealthStatus::Healthy);
    }

    #[test]
    fn truncated_body_is_unhealthy() {
        assert_eq!(parse_broker_count(&[0, 0, 0, 0]), HealthStatus::Unhealthy);
    }
}
