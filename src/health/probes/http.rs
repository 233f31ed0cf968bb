use super::{Probe, ProbeError};
use crate::config::health_check::HealthCheckConfig;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::health::status::HealthStatus;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

pub struct HttpProbe;

impl Probe for HttpProbe {
    fn check(
        &self,
        _local_port: u16,
        _context: Option<&str>,
        config: &HealthCheckConfig,
        timeout: Duration,
        _cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError> {
        let HealthCheckConfig::Http {
            url,
            method,
            expected_status,
            headers,
        } = config
        else {
            return Err(ProbeError::Protocol("http probe given non-http config".to_string()));
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProbeError::Protocol(err.to_string()))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|err| ProbeError::Protocol(err.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|err| ProbeError::Protocol(err.to_string()))?;
            header_map.insert(name, value);
        }

        let method = method
            .parse::<reqwest::Method>()
            .map_err(|err| ProbeError::Protocol(err.to_string()))?;

        let response = match client.request(method, url).headers(header_map).send() {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Err(ProbeError::Timeout(timeout)),
            Err(_) => return Ok(HealthStatus::Unhealthy),
        };

        let status = response.status().as_u16();
        if expected_status.contains(&status) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;
    use std::collections::HashMap;

    #[test]
    fn rejects_non_http_config() {
        let (_publisher, consumer) = pub_sub::<CancellationMessage>();
        let err = HttpProbe
            .check(1, None, &HealthCheckConfig::Tcp, Duration::from_millis(100), &consumer)
            .unwrap_err();
        assert!(matches!(err, ProbeError::Protocol(_)));
    }

    #[test]
    fn expected_status_defaults_to_200() {
        let config = HealthCheckConfig::Http {
            url: "http://127.0.0.1:1/healthz".to_string(),
            method: "GET".to_string(),
            expected_status: vec![200],
            headers: HashMap::new(),
        };
        assert!(matches!(config, HealthCheckConfig::Http { ref expected_status, .. } if expected_status == &[200]));
    }
}
