//! Config-reload reconciliation (`spec.md` §4.1, §4.8): compares the desired set of
//! `ServiceDefinition`s against what's currently running and produces a plan, without
//! touching any running state itself — `Supervisor::reconcile` executes the plan.

use crate::config::service::ServiceDefinition;
use crate::identity::ServiceId;
use std::collections::HashMap;

/// One step of a reconciliation plan. Order matters only in that stops should be
/// applied before starts if a local port is being reused by a different service.
#[derive(Debug, PartialEq)]
pub enum ReconcileAction {
    /// No longer present in the desired set, or its identifying fields changed
    /// (so it now hashes to a different id) — stop the old instance.
    Stop(ServiceId),
    /// Newly present, or its id changed — start it.
    Start(ServiceDefinition),
    /// Same id, but a non-identifying field (tags, health check tuning, restart
    /// policy, description) changed — apply in place, no restart.
    Update(ServiceDefinition),
}

/// `desired` is the freshly loaded config; `running` maps each currently running
/// service's id to the `ServiceDefinition` it was started from.
pub fn plan(desired: &[ServiceDefinition], running: &HashMap<ServiceId, ServiceDefinition>) -> Vec<ReconcileAction> {
    let mut actions = Vec::new();
    let mut desired_ids = std::collections::HashSet::new();

    for def in desired {
        if !def.enabled {
            continue;
        }
        let id = ServiceId::from_definition(def);
        desired_ids.insert(id);

        match running.get(&id) {
            None => actions.push(ReconcileAction::Start(def.clone())),
            Some(current) if current != def => actions.push(ReconcileAction::Update(def.clone())),
            Some(_) => {}
        }
    }

    for id in running.keys() {
        if !desired_ids.contains(id) {
            actions.push(ReconcileAction::Stop(*id));
        }
    }

    actions
}
