use super::{Probe, ProbeError};
use crate::config::health_check::HealthCheckConfig;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::health::status::HealthStatus;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

pub struct TcpProbe;

impl Probe for TcpProbe {
    fn check(
        &self,
        local_port: u16,
        _context: Option<&str>,
        _config: &HealthCheckConfig,
        timeout: Duration,
        _cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError> {
        let addr: SocketAddr = ([127, 0, 0, 1], local_port).into();
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(_) => Ok(HealthStatus::Unhealthy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;
    use std::net::TcpListener;

    #[test]
    fn healthy_when_port_accepts_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_publisher, consumer) = pub_sub::<CancellationMessage>();

        let status = TcpProbe
            .check(port, None, &HealthCheckConfig::Tcp, Duration::from_millis(200), &consumer)
            .unwrap();
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn unhealthy_when_nothing_listening() {
        let (_publisher, consumer) = pub_sub::<CancellationMessage>();
        // Port 1 is a privileged port almost never bound in test sandboxes.
        let status = TcpProbe
            .check(1, None, &HealthCheckConfig::Tcp, Duration::from_millis(200), &consumer)
            .unwrap();
        assert_eq!(status, HealthStatus::Unhealthy);
    }
}
