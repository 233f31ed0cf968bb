//! Pluggable health-probe implementations (`spec.md` §4.4).

pub mod cluster;
pub mod http;
pub mod kafka;
pub mod postgres;
pub mod tcp;

use crate::config::health_check::HealthCheckConfig;
use crate::event::channel::EventConsumer;
use crate::event::cancellation::CancellationMessage;
use crate::health::status::HealthStatus;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Protocol(String),
}

/// One independent check implementation. `local_port` is always the forward's local
/// side — every probe except `cluster` talks to `localhost:<local_port>`. `context`
/// is the Kubernetes context name, only consulted by the `cluster` probe.
pub trait Probe {
    fn check(
        &self,
        local_port: u16,
        context: Option<&str>,
        config: &HealthCheckConfig,
        timeout: Duration,
        cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError>;
}

/// Picks the probe implementation matching `config`'s variant.
pub fn probe_for(config: &HealthCheckConfig) -> Box<dyn Probe + Send + Sync> {
    match config {
        HealthCheckConfig::Tcp => Box::new(tcp::TcpProbe),
        HealthCheckConfig::Http { .. } => Box::new(http::HttpProbe),
        HealthCheckConfig::Kafka { .. } => Box::new(kafka::KafkaProbe),
        HealthCheckConfig::Postgres { .. } => Box::new(postgres::PostgresProbe),
        HealthCheckConfig::Cluster { .. } => Box::new(cluster::ClusterProbe),
    }
}
