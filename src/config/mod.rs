//! Declarative configuration: service definitions, health-check and restart-policy
//! schemas, shared defaults, and the YAML loader (`spec.md` §3, §6).

pub mod defaults;
pub mod health_check;
pub mod loader;
pub mod restart_policy;
pub mod service;

use serde::Deserialize;
use service::ServiceDefinition;

/// Top-level document at the configured config path (`spec.md` §6 "Config file").
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, thiserror::Error)]
pub enum RootConfigError {
    #[error("duplicate service name `{0}`")]
    DuplicateName(String),
    #[error("service `{0}` duplicates local_port {1} used by `{2}`")]
    DuplicateLocalPort(String, u16, String),
    #[error(transparent)]
    Service(#[from] service::ServiceDefinitionError),
}

impl RootConfig {
    pub fn validate(&self) -> Result<(), RootConfigError> {
        let mut seen_names = std::collections::HashSet::new();
        let mut seen_ports: std::collections::HashMap<u16, &str> = std::collections::HashMap::new();

        for def in &self.services {
            def.validate()?;
            if !seen_names.insert(def.name.as_str()) {
                return Err(RootConfigError::DuplicateName(def.name.clone()));
            }
            if let Some(owner) = seen_ports.insert(def.local_port, def.name.as_str()) {
                return Err(RootConfigError::DuplicateLocalPort(
                    def.name.clone(),
                    def.local_port,
                    owner.to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::{ConnectionSpec, Technology};

    fn def(name: &str, local_port: u16) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            technology: Technology::Kubernetes,
            local_port,
            remote_port: 5432,
            connection: ConnectionSpec::Kubernetes {
                kind: "service".to_string(),
                name: "postgres".to_string(),
                namespace: None,
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
    fn duplicate_name_rejected() {
        let cfg = RootConfig {
            services: vec![def("db", 5432), def("db", 5433)],
        };
        assert!(matches!(
            cfg.validate(),
            Err(RootConfigError::DuplicateName(_))
        ));
    }

    #[test]
    fn duplicate_local_port_rejected() {
        let cfg = RootConfig {
            services: vec![def("db", 5432), def("cache", 5432)],
        };
        assert!(matches!(
            cfg.validate(),
            Err(RootConfigError::DuplicateLocalPort(_, 5432, _))
        ));
    }

    #[test]
    fn distinct_services_pass() {
        let cfg = RootConfig {
            services: vec![def("db", 5432), def("cache", 6379)],
        };
        cfg.validate().unwrap();
    }
}
