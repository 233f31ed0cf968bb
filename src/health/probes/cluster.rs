//! Out-of-band cluster probe (`spec.md` §4.4): shells out to `kubectl` against the
//! service's context rather than touching the forwarded local port. A failure here
//! is meant to be composed by the health monitor with the local-socket probe result
//! (`spec.md` §9: default policy is unhealthy if either is unhealthy).

use super::{Probe, ProbeError};
use crate::config::health_check::HealthCheckConfig;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use crate::health::status::HealthStatus;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const KUBECTL_BIN: &str = "kubectl";

pub struct ClusterProbe;

impl Probe for ClusterProbe {
    fn check(
        &self,
        _local_port: u16,
        context: Option<&str>,
        config: &HealthCheckConfig,
        timeout: Duration,
        _cancel: &EventConsumer<CancellationMessage>,
    ) -> Result<HealthStatus, ProbeError> {
        let HealthCheckConfig::Cluster { commands, .. } = config else {
            return Err(ProbeError::Protocol("cluster probe given non-cluster config".to_string()));
        };

        let deadline = Instant::now() + timeout;
        let mut argv_sets = Vec::new();
        if commands.cluster_info {
            argv_sets.push(vec!["cluster-info".to_string()]);
        }
        if commands.pod_status {
            argv_sets.push(vec!["get".to_string(), "pods".to_string(), "--all-namespaces".to_string()]);
        }
        if commands.node_status {
            argv_sets.push(vec!["get".to_string(), "nodes".to_string()]);
        }

        for argv in argv_sets {
            if Instant::now() >= deadline {
                return Err(ProbeError::Timeout(timeout));
            }
            match run_kubectl(&argv, context, deadline) {
                Some(true) => continue,
                Some(false) => return Ok(HealthStatus::Unhealthy),
                None => return Err(ProbeError::Timeout(timeout)),
            }
        }
        Ok(HealthStatus::Healthy)
    }
}

/// Runs `kubectl <argv> [--context <context>]`, polling `try_wait` so the call
/// stays bounded by `deadline` instead of blocking on a hung child.
fn run_kubectl(argv: &[String], context: Option<&str>, deadline: Instant) -> Option<bool> {
    let mut command = Command::new(KUBECTL_BIN);
    command.args(argv).stdout(Stdio::null()).stderr(Stdio::null());
    if let Some(context) = context {
        command.args(["--context", context]);
    }

    let mut child = command.spawn().ok()?;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status.success()),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_cluster_config() {
        let (_publisher, consumer) = crate::event::channel::pub_sub::<CancellationMessage>();
        let err = ClusterProbe
            .check(0, None, &HealthCheckConfig::Tcp, Duration::from_secs(1), &consumer)
            .unwrap_err();
        assert!(matches!(err, ProbeError::Protocol(_)));
    }
}
