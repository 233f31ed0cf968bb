//! `spec.md` §3 `ServiceDefinition` and the two supported connection technologies.

use crate::config::health_check::HealthCheckSpec;
use crate::config::restart_policy::RestartPolicyConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub technology: Technology,
    pub local_port: u16,
    pub remote_port: u16,
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    #[serde(default)]
    pub restart_policy: RestartPolicyConfig,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Kubernetes,
    Ssh,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "technology", rename_all = "lowercase")]
pub enum ConnectionSpec {
    Kubernetes {
        /// `pod`, `service`, or `deployment` — what `kubectl port-forward` targets.
        kind: String,
        name: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        context: Option<String>,
    },
    Ssh {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        user: Option<String>,
        /// Private key path, a non-identifying auth hint (`spec.md` §3).
        #[serde(default)]
        identity_file: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceDefinitionError {
    #[error("service name must not be empty")]
    EmptyName,
    #[error("local_port must not be 0")]
    ZeroLocalPort,
    #[error("remote_port must not be 0")]
    ZeroRemotePort,
    #[error("technology {0:?} does not match connection variant")]
    TechnologyMismatch(Technology),
    #[error("invalid health check: {0}")]
    HealthCheck(#[from] crate::config::health_check::HealthCheckConfigError),
    #[error("invalid restart policy: {0}")]
    RestartPolicy(#[from] crate::config::restart_policy::RestartPolicyError),
}

impl ServiceDefinition {
    /// Short tag distinguishing the connection technology, used as an identity field
    /// so the same ports/name under a different technology yield a different id.
    pub fn technology_tag(&self) -> &'static str {
        match self.technology {
            Technology::Kubernetes => "kubernetes",
            Technology::Ssh => "ssh",
        }
    }

    pub fn validate(&self) -> Result<(), ServiceDefinitionError> {
        if self.name.trim().is_empty() {
            return Err(ServiceDefinitionError::EmptyName);
        }
        if self.local_port == 0 {
            return Err(ServiceDefinitionError::ZeroLocalPort);
        }
        if self.remote_port == 0 {
            return Err(ServiceDefinitionError::ZeroRemotePort);
        }
        let matches = matches!(
            (self.technology, &self.connection),
            (Technology::Kubernetes, ConnectionSpec::Kubernetes { .. })
                | (Technology::Ssh, ConnectionSpec::Ssh { .. })
        );
        if !matches {
            return Err(ServiceDefinitionError::TechnologyMismatch(self.technology));
        }
        self.health_check.validate()?;
        self.restart_policy.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;

    fn valid_def() -> ServiceDefinition {
        ServiceDefinition {
            name: "db".to_string(),
            technology: Technology::Kubernetes,
            local_port: 5432,
            remote_port: 5432,
            connection: ConnectionSpec::Kubernetes {
                kind: "service".to_string(),
                name: "postgres".to_string(),
                namespace: Some("default".to_string()),
                context: None,
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: HealthCheckSpec::default(),
            restart_policy: RestartPolicyConfig::default(),
        }
    }

    #[test]
    fn valid_definition_passes() {
        valid_def().validate().unwrap();
    }

    #[test]
    fn empty_name_rejected() {
        let mut def = valid_def();
        def.name = "  ".to_string();
        assert!(matches!(
            def.validate(),
            Err(ServiceDefinitionError::EmptyName)
        ));
    }

    #[test]
    fn zero_port_rejected() {
        let mut def = valid_def();
        def.local_port = 0;
        assert!(matches!(
            def.validate(),
            Err(ServiceDefinitionError::ZeroLocalPort)
        ));
    }

    #[test]
    fn technology_connection_mismatch_rejected() {
        let mut def = valid_def();
        def.technology = Technology::Ssh;
        assert!(matches!(
            def.validate(),
            Err(ServiceDefinitionError::TechnologyMismatch(Technology::Ssh))
        ));
    }
}
