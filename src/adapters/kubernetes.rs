//! Kubernetes adapter (`spec.md` §4.2): `kubectl port-forward <kind>/<name> <local>:<remote>`.

use super::AdapterError;
use crate::config::service::{ConnectionSpec, ServiceDefinition};

const KUBECTL_BIN: &str = "kubectl";

pub fn build_argv(def: &ServiceDefinition) -> Result<(String, Vec<String>), AdapterError> {
    let ConnectionSpec::Kubernetes {
        kind,
        name,
        namespace,
        context,
    } = &def.connection
    else {
        unreachable!("build_argv called with a non-kubernetes connection");
    };

    let mut argv = vec![
        "port-forward".to_string(),
        format!("{kind}/{name}"),
        format!("{}:{}", def.local_port, def.remote_port),
    ];
    if let Some(namespace) = namespace {
        argv.push("--namespace".to_string());
        argv.push(namespace.clone());
    }
    if let Some(context) = context {
        argv.push("--context".to_string());
        argv.push(context.clone());
    }

    Ok((KUBECTL_BIN.to_string(), argv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::Technology;

    fn def(namespace: Option<&str>, context: Option<&str>) -> ServiceDefinition {
        ServiceDefinition {
            name: "db".to_string(),
            technology: Technology::Kubernetes,
            local_port: 5432,
            remote_port: 5432,
            connection: ConnectionSpec::Kubernetes {
                kind: "service".to_string(),
                name: "postgres".to_string(),
                namespace: namespace.map(str::to_string),
                context: context.map(str::to_string),
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: HealthCheckSpec::default(),
            restart_policy: RestartPolicyConfig::default(),
        }
    }

    #[test]
    fn builds_minimal_argv() {
        let (bin, argv) = build_argv(&def(None, None)).unwrap();
        assert_eq!(bin, "kubectl");
        assert_eq!(argv, vec!["port-forward", "service/postgres", "5432:5432"]);
    }

    #[test]
    fn includes_namespace_and_context_when_present() {
        let (_bin, argv) = build_argv(&def(Some("default"), Some("prod"))).unwrap();
        assert!(argv.contains(&"--namespace".to_string()));
        assert!(argv.contains(&"default".to_string()));
        assert!(argv.contains(&"--context".to_string()));
        assert!(argv.contains(&"prod".to_string()));
    }
}
