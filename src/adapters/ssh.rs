//! SSH adapter (`spec.md` §4.2): `ssh -N -L <local>:localhost:<remote> [-p port]
//! [-i keyfile] user@host`, strict host-key checking, a short connect timeout, and
//! `ExitOnForwardFailure=yes` so a failed remote bind kills the process instead of
//! leaving a half-open tunnel. Password auth, when used, must never reach argv —
//! `sshpass -e` (reading `SSHPASS` from the environment) is used instead, which is
//! the adapter's own decision, not configuration the service definition carries.

use super::AdapterError;
use crate::config::service::{ConnectionSpec, ServiceDefinition};

const SSH_BIN: &str = "ssh";
const SSHPASS_BIN: &str = "sshpass";
const CONNECT_TIMEOUT_S: u32 = 10;

pub fn build_argv(def: &ServiceDefinition) -> Result<(String, Vec<String>), AdapterError> {
    let ConnectionSpec::Ssh {
        host,
        port,
        user,
        identity_file,
    } = &def.connection
    else {
        unreachable!("build_argv called with a non-ssh connection");
    };

    let mut ssh_argv = vec![
        "-N".to_string(),
        "-L".to_string(),
        format!("{}:localhost:{}", def.local_port, def.remote_port),
        "-o".to_string(),
        "StrictHostKeyChecking=yes".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={CONNECT_TIMEOUT_S}"),
    ];
    if let Some(port) = port {
        ssh_argv.push("-p".to_string());
        ssh_argv.push(port.to_string());
    }
    if let Some(identity_file) = identity_file {
        ssh_argv.push("-i".to_string());
        ssh_argv.push(identity_file.clone());
    }

    let destination = match user {
        Some(user) => format!("{user}@{host}"),
        None => host.clone(),
    };
    ssh_argv.push(destination);

    if std::env::var_os("SSHPASS").is_some() {
        let mut argv = vec!["-e".to_string(), SSH_BIN.to_string()];
        argv.extend(ssh_argv);
        Ok((SSHPASS_BIN.to_string(), argv))
    } else {
        Ok((SSH_BIN.to_string(), ssh_argv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckSpec;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::Technology;
    use serial_test::serial;

    fn def() -> ServiceDefinition {
        ServiceDefinition {
            name: "web".to_string(),
            technology: Technology::Ssh,
            local_port: 8080,
            remote_port: 80,
            connection: ConnectionSpec::Ssh {
                host: "example.com".to_string(),
                port: Some(2222),
                user: Some("deploy".to_string()),
                identity_file: Some("/home/deploy/.ssh/id_ed25519".to_string()),
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: HealthCheckSpec::default(),
            restart_policy: RestartPolicyConfig::default(),
        }
    }

    #[test]
    #[serial]
    fn builds_key_based_argv_without_sshpass() {
        std::env::remove_var("SSHPASS");
        let (bin, argv) = build_argv(&def()).unwrap();
        assert_eq!(bin, "ssh");
        assert!(argv.contains(&"deploy@example.com".to_string()));
        assert!(argv.contains(&"-i".to_string()));
        assert!(!argv.iter().any(|a| a.contains("SSHPASS")));
    }

    #[test]
    #[serial]
    fn wraps_with_sshpass_when_env_var_present() {
        std::env::set_var("SSHPASS", "hunter2");
        let (bin, argv) = build_argv(&def()).unwrap();
        std::env::remove_var("SSHPASS");
        assert_eq!(bin, "sshpass");
        assert_eq!(argv[0], "-e");
        assert_eq!(argv[1], "ssh");
        assert!(!argv.iter().any(|a| a == "hunter2"));
    }
}
