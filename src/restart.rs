//! Restart Manager (`spec.md` §4.6): a stateless policy evaluator plus a per-service
//! attempt counter. Delay at attempt *n* is `min(initial * mult^(n-1), max)`, jittered
//! by ±10% — the jitter and the hard cap are this implementation's addition over the
//! plain exponential backoff the supervisor's upstream counterpart uses, since
//! unbounded exponential growth would eventually overflow `Duration`.

use crate::config::restart_policy::RestartPolicyConfig;
use crate::identity::ServiceId;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub enum RestartDecision {
    Restart { delay: Duration, attempt: u32 },
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
struct ServiceRestartState {
    attempt: u32,
    healthy_since: Option<Instant>,
}

impl Default for ServiceRestartState {
    fn default() -> Self {
        Self {
            attempt: 0,
            healthy_since: None,
        }
    }
}

pub struct RestartManager {
    state: HashMap<ServiceId, ServiceRestartState>,
}

impl Default for RestartManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartManager {
    pub fn new() -> Self {
        Self {
            state: HashMap::new(),
        }
    }

    /// Evaluates whether `id` should be restarted under `policy`, incrementing its
    /// attempt counter as a side effect when the answer is yes.
    pub fn should_restart(&mut self, id: ServiceId, policy: &RestartPolicyConfig) -> RestartDecision {
        if !policy.enabled {
            return RestartDecision::GiveUp;
        }
        let entry = self.state.entry(id).or_default();
        entry.healthy_since = None;

        let next_attempt = entry.attempt + 1;
        if policy.max_attempts != 0 && next_attempt > policy.max_attempts {
            return RestartDecision::GiveUp;
        }
        entry.attempt = next_attempt;

        let delay = backoff_delay(policy, next_attempt);
        RestartDecision::Restart {
            delay,
            attempt: next_attempt,
        }
    }

    /// Marks `id` as having become healthy; call on every `healthy` transition so
    /// [`Self::maybe_reset`] can tell once it has stayed healthy long enough.
    pub fn mark_healthy(&mut self, id: ServiceId, now: Instant) {
        self.state.entry(id).or_default().healthy_since = Some(now);
    }

    /// Resets the attempt counter once `id` has been continuously healthy for
    /// `10 * initial_delay_s` (`spec.md` §4.6).
    pub fn maybe_reset(&mut self, id: ServiceId, policy: &RestartPolicyConfig, now: Instant) {
        let sustained_window = Duration::from_secs_f64(policy.initial_delay_s * 10.0);
        if let Some(entry) = self.state.get_mut(&id) {
            if let Some(healthy_since) = entry.healthy_since {
                if now.duration_since(healthy_since) >= sustained_window {
                    entry.attempt = 0;
                }
            }
        }
    }

    pub fn forget(&mut self, id: ServiceId) {
        self.state.remove(&id);
    }

    pub fn attempt_count(&self, id: ServiceId) -> u32 {
        self.state.get(&id).map(|s| s.attempt).unwrap_or(0)
    }
}

fn backoff_delay(policy: &RestartPolicyConfig, attempt: u32) -> Duration {
    let exponent = (attempt - 1) as i32;
    let base = policy.initial_delay_s * policy.backoff_multiplier.powi(exponent);
    let capped = base.min(policy.max_delay_s);

    let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
    let jittered = (capped * (1.0 + jitter_fraction)).max(0.0);
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::service::{ConnectionSpec, ServiceDefinition, Technology};
    use crate::config::health_check::HealthCheckSpec;

    fn id(local_port: u16) -> ServiceId {
        ServiceId::from_definition(&ServiceDefinition {
            name: "db".to_string(),
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
        })
    }

    fn policy(max_attempts: u32) -> RestartPolicyConfig {
        RestartPolicyConfig {
            enabled: true,
            max_attempts,
            initial_delay_s: 1.0,
            max_delay_s: 4.0,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn delay_is_capped_and_within_jitter_band() {
        let policy = policy(0);
        for attempt in 1..=5 {
            let delay = backoff_delay(&policy, attempt).as_secs_f64();
            let uncapped = policy.initial_delay_s * policy.backoff_multiplier.powi(attempt as i32 - 1);
            let capped = uncapped.min(policy.max_delay_s);
            assert!(delay <= capped * 1.1 + 1e-6, "attempt {attempt}: {delay} > {capped}");
            assert!(delay >= (capped * 0.9 - 1e-6).max(0.0), "attempt {attempt}: {delay} < {capped}");
        }
    }

    #[test]
    fn disabled_policy_always_gives_up() {
        let mut manager = RestartManager::new();
        let mut policy = policy(0);
        policy.enabled = false;
        assert!(matches!(
            manager.should_restart(id(1), &policy),
            RestartDecision::GiveUp
        ));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut manager = RestartManager::new();
        let policy = policy(2);
        let svc = id(2);

        assert!(matches!(
            manager.should_restart(svc, &policy),
            RestartDecision::Restart { attempt: 1, .. }
        ));
        assert!(matches!(
            manager.should_restart(svc, &policy),
            RestartDecision::Restart { attempt: 2, .. }
        ));
        assert!(matches!(
            manager.should_restart(svc, &policy),
            RestartDecision::GiveUp
        ));
    }

    #[test]
    fn zero_max_attempts_is_unbounded() {
        let mut manager = RestartManager::new();
        let policy = policy(0);
        let svc = id(3);
        for _ in 0..50 {
            assert!(matches!(
                manager.should_restart(svc, &policy),
                RestartDecision::Restart { .. }
            ));
        }
    }

    #[test]
    fn sustained_health_resets_attempt_counter() {
        let mut manager = RestartManager::new();
        let policy = policy(0);
        let svc = id(4);

        manager.should_restart(svc, &policy);
        manager.should_restart(svc, &policy);
        assert_eq!(manager.attempt_count(svc), 2);

        let now = Instant::now();
        manager.mark_healthy(svc, now - Duration::from_secs(11));
        manager.maybe_reset(svc, &policy, now);
        assert_eq!(manager.attempt_count(svc), 0);
    }
}
