use crate::config::defaults::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_HEALTH_INTERVAL_S, DEFAULT_HEALTH_TIMEOUT_S,
    DEFAULT_SUCCESS_THRESHOLD,
};
use serde::Deserialize;
use std::collections::HashMap;

/// `spec.md` §3 `HealthCheckSpec` / §6 "Health-check config schemas".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthCheckSpec {
    pub kind: HealthCheckKind,
    pub interval_s: f64,
    pub timeout_s: f64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub config: HealthCheckConfig,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            kind: HealthCheckKind::Tcp,
            interval_s: DEFAULT_HEALTH_INTERVAL_S,
            timeout_s: DEFAULT_HEALTH_TIMEOUT_S,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            config: HealthCheckConfig::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    Tcp,
    Http,
    Kafka,
    Postgres,
    Cluster,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthCheckConfig {
    Tcp,
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default = "default_expected_status")]
        expected_status: Vec<u16>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Kafka {
        bootstrap_servers: String,
    },
    Postgres {
        database: String,
        user: String,
        #[serde(default)]
        password: String,
        #[serde(default = "default_postgres_host")]
        host: String,
        port: u16,
    },
    Cluster {
        #[serde(default)]
        commands: ClusterCommands,
        interval_s: f64,
        timeout_s: f64,
    },
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClusterCommands {
    #[serde(default = "default_true")]
    pub cluster_info: bool,
    #[serde(default)]
    pub pod_status: bool,
    #[serde(default)]
    pub node_status: bool,
    #[serde(default)]
    pub events_on_failure: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum HealthCheckConfigError {
    #[error("health check kind {kind:?} requires `config.kind` to match, got {config_kind}")]
    KindMismatch { kind: HealthCheckKind, config_kind: String },
    #[error("interval_s and timeout_s must be > 0")]
    NonPositiveTiming,
    #[error("failure_threshold and success_threshold must be >= 1")]
    ZeroThreshold,
}

impl HealthCheckSpec {
    pub fn validate(&self) -> Result<(), HealthCheckConfigError> {
        if self.interval_s <= 0.0 || self.timeout_s <= 0.0 {
            return Err(HealthCheckConfigError::NonPositiveTiming);
        }
        if self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(HealthCheckConfigError::ZeroThreshold);
        }
        let config_kind = match &self.config {
            HealthCheckConfig::Tcp => "tcp",
            HealthCheckConfig::Http { .. } => "http",
            HealthCheckConfig::Kafka { .. } => "kafka",
            HealthCheckConfig::Postgres { .. } => "postgres",
            HealthCheckConfig::Cluster { .. } => "cluster",
        };
        let expected = match self.kind {
            HealthCheckKind::Tcp => "tcp",
            HealthCheckKind::Http => "http",
            HealthCheckKind::Kafka => "kafka",
            HealthCheckKind::Postgres => "postgres",
            HealthCheckKind::Cluster => "cluster",
        };
        if expected != config_kind {
            return Err(HealthCheckConfigError::KindMismatch {
                kind: self.kind,
                config_kind: config_kind.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_tcp_and_valid() {
        let spec = HealthCheckSpec::default();
        assert_eq!(spec.kind, HealthCheckKind::Tcp);
        spec.validate().unwrap();
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut spec = HealthCheckSpec::default();
        spec.failure_threshold = 0;
        assert!(matches!(
            spec.validate(),
            Err(HealthCheckConfigError::ZeroThreshold)
        ));
    }

    #[test]
    fn kind_config_mismatch_rejected() {
        let mut spec = HealthCheckSpec::default();
        spec.config = HealthCheckConfig::Http {
            url: "http://localhost:8080/healthz".to_string(),
            method: "GET".to_string(),
            expected_status: vec![200],
            headers: HashMap::new(),
        };
        assert!(matches!(
            spec.validate(),
            Err(HealthCheckConfigError::KindMismatch { .. })
        ));
    }
}
