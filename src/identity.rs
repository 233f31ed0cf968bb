//! Deterministic service identity (`spec.md` §3, §9 "Deterministic identity").
//!
//! `ServiceId` is a pure function of a service's *identifying* configuration fields.
//! Tags, descriptions, and probe/restart tuning never affect it, so reconciliation
//! across daemon restarts (and across config reloads that only touch tuning knobs)
//! can tell "same service" from "different service" just by comparing ids.

use crate::config::service::{ConnectionSpec, ServiceDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed namespace for every generated id — not user configurable, so that rebuilding
/// the binary never changes ids for an unchanged configuration.
const NAMESPACE: Uuid = Uuid::from_bytes([
    0x6c, 0x6f, 0x63, 0x61, 0x6c, 0x70, 0x6f, 0x72, 0x74, 0x2e, 0x69, 0x64, 0x2e, 0x76, 0x31, 0x00,
]);

/// A separator illegal in any single identifying field (ports are numeric, names/hosts
/// are validated to exclude it), so concatenation can't collide across field
/// boundaries, e.g. `name="a", port=1` vs `name="a1"`.
const FIELD_SEP: u8 = 0x1f; // ASCII unit separator

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(Uuid);

impl ServiceId {
    pub fn from_definition(def: &ServiceDefinition) -> Self {
        let mut buf = Vec::new();
        push_field(&mut buf, &def.name);
        push_field(&mut buf, def.technology_tag());
        push_field(&mut buf, &def.local_port.to_string());
        push_field(&mut buf, &def.remote_port.to_string());

        match &def.connection {
            ConnectionSpec::Kubernetes {
                kind,
                name,
                namespace,
                context,
            } => {
                push_field(&mut buf, kind);
                push_field(&mut buf, name);
                push_field(&mut buf, namespace.as_deref().unwrap_or(""));
                push_field(&mut buf, context.as_deref().unwrap_or(""));
            }
            ConnectionSpec::Ssh { host, port, user, .. } => {
                push_field(&mut buf, host);
                push_field(&mut buf, &port.unwrap_or(22).to_string());
                push_field(&mut buf, user.as_deref().unwrap_or(""));
            }
        }

        Self(Uuid::new_v5(&NAMESPACE, &buf))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First 8 hex characters, used to keep service-log file names short
    /// (`spec.md` §6 `<name>_<short-id>.log`).
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

fn push_field(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(field.as_bytes());
    buf.push(FIELD_SEP);
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::Technology;

    fn base_def() -> ServiceDefinition {
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
    fn same_identifying_fields_yield_same_id() {
        let a = base_def();
        let mut b = base_def();
        b.tags = vec!["nightly".to_string()];
        b.description = Some("a db".to_string());
        b.health_check.interval_s = 30.0;

        assert_eq!(
            ServiceId::from_definition(&a),
            ServiceId::from_definition(&b)
        );
    }

    #[test]
    fn changing_local_port_changes_id() {
        let a = base_def();
        let mut b = base_def();
        b.local_port = 5433;

        assert_ne!(
            ServiceId::from_definition(&a),
            ServiceId::from_definition(&b)
        );
    }

    #[test]
    fn changing_namespace_changes_id() {
        let a = base_def();
        let mut b = base_def();
        if let ConnectionSpec::Kubernetes { namespace, .. } = &mut b.connection {
            *namespace = Some("other".to_string());
        }

        assert_ne!(
            ServiceId::from_definition(&a),
            ServiceId::from_definition(&b)
        );
    }

    #[test]
    fn field_boundary_does_not_collide() {
        let mut a = base_def();
        a.name = "a".to_string();
        a.local_port = 1;

        let mut b = base_def();
        b.name = "a1".to_string();
        b.local_port = 0; // won't validate in practice, but the hash must still differ

        assert_ne!(
            ServiceId::from_definition(&a),
            ServiceId::from_definition(&b)
        );
    }

    #[test]
    fn is_stable_across_calls() {
        let def = base_def();
        assert_eq!(
            ServiceId::from_definition(&def),
            ServiceId::from_definition(&def)
        );
    }
}
