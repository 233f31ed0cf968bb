//! One cooperative task per monitored service (`spec.md` §4.5). Sleeps the configured
//! interval, runs the service's probe, and notifies the supervisor only on a
//! failure/success threshold crossing.

use crate::config::health_check::HealthCheckSpec;
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{EventConsumer, EventPublisher};
use crate::event::SupervisorEvent;
use crate::health::probes::{probe_for, Probe};
use crate::health::status::{HealthStatus, ThresholdTracker};
use crate::identity::ServiceId;
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const THREAD_NAME_PREFIX: &str = "health-monitor";

/// Spawns the monitoring task for one running service epoch. `context` is the
/// Kubernetes context name when applicable (used only by the cluster probe).
pub fn spawn(
    id: ServiceId,
    local_port: u16,
    context: Option<String>,
    spec: HealthCheckSpec,
    epoch_start: SystemTime,
    events: EventPublisher<SupervisorEvent>,
) -> StartedThreadContext {
    let thread_name = format!("{THREAD_NAME_PREFIX}-{}", id.short());
    let probe = probe_for(&spec.config);

    let callback = move |stop_consumer: EventConsumer<CancellationMessage>| {
        run_loop(id, local_port, context.as_deref(), &spec, epoch_start, &events, probe.as_ref(), &stop_consumer);
    };

    NotStartedThreadContext::new(thread_name, callback).start()
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    id: ServiceId,
    local_port: u16,
    context: Option<&str>,
    spec: &HealthCheckSpec,
    epoch_start: SystemTime,
    events: &EventPublisher<SupervisorEvent>,
    probe: &dyn Probe,
    stop_consumer: &EventConsumer<CancellationMessage>,
) {
    let interval = Duration::from_secs_f64(spec.interval_s.max(0.0));
    let timeout = Duration::from_secs_f64(spec.timeout_s.max(0.0));
    let mut tracker = ThresholdTracker::new(spec.failure_threshold, spec.success_threshold);

    loop {
        if stop_consumer.is_cancelled(interval) {
            debug!(service = %id, "health monitor stopping");
            return;
        }

        let status = probe
            .check(local_port, context, &spec.config, timeout, stop_consumer)
            .unwrap_or_else(|err| {
                warn!(service = %id, error = %err, "probe failed");
                HealthStatus::Unhealthy
            });

        if let Some(new_status) = tracker.record(status.is_healthy()) {
            let _ = events.publish(SupervisorEvent::HealthChanged {
                id,
                status: new_status,
                epoch_start,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::health_check::HealthCheckConfig;
    use crate::config::restart_policy::RestartPolicyConfig;
    use crate::config::service::{ConnectionSpec, ServiceDefinition, Technology};
    use crate::event::channel::pub_sub;
    use std::net::TcpListener;
    use std::time::Duration as StdDuration;

    #[test]
    fn reports_healthy_once_probe_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (events_pub, events_sub) = pub_sub::<SupervisorEvent>();

        let spec = HealthCheckSpec {
            interval_s: 0.01,
            timeout_s: 0.2,
            failure_threshold: 3,
            success_threshold: 1,
            config: HealthCheckConfig::Tcp,
            ..HealthCheckSpec::default()
        };
        let def = ServiceDefinition {
            name: "db".to_string(),
            technology: Technology::Kubernetes,
            local_port: port,
            remote_port: port,
            connection: ConnectionSpec::Kubernetes {
                kind: "service".to_string(),
                name: "postgres".to_string(),
                namespace: None,
                context: None,
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: spec.clone(),
            restart_policy: RestartPolicyConfig::default(),
        };
        let id = ServiceId::from_definition(&def);
        let epoch = SystemTime::now();

        let handle = spawn(id, port, None, spec, epoch, events_pub);

        let event = events_sub.recv_timeout(StdDuration::from_secs(2)).unwrap();
        match event {
            SupervisorEvent::HealthChanged { status, .. } => {
                assert_eq!(status, HealthStatus::Healthy);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.stop().unwrap();
    }
}
