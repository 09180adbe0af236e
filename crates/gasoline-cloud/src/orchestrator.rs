//! Deploy orchestrator
//!
//! Runs one coordinator per group that has changes. All coordinators run
//! concurrently and always run to completion; a failure in one group never
//! stops another.
//!
//! Within a group the coordinator exclusively owns the deploy state and
//! output of its members. Resource tasks only call the backend and hand
//! their result back through a [`JoinSet`], so no state is shared between
//! tasks. A pending resource is launched once nothing in its transitive
//! dependency closure is still active, which also gates it on changed
//! resources reachable only through unchanged ones. The first failure
//! cancels every resource of the group that has not started yet; in-flight
//! calls finish normally.

use crate::action::Action;
use crate::backend::ProvisioningBackend;
use crate::error::{DeployError, FailedResource, ProvisionError};
use crate::plan::DeployPlan;
use crate::snapshot::{DeploySnapshot, SnapshotEntry};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::join_all;
use gasoline_core::ResourceId;
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, instrument, warn};

/// Per-run lifecycle of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Pending,
    InProgress(Action),
    Complete(Action),
    Failed(Action),
    Canceled,
}

impl DeployState {
    /// `PENDING` or `*_IN_PROGRESS`
    pub fn is_active(&self) -> bool {
        matches!(self, DeployState::Pending | DeployState::InProgress(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployState::Pending => f.write_str("PENDING"),
            DeployState::InProgress(action) => write!(f, "{}_IN_PROGRESS", action.label()),
            DeployState::Complete(action) => write!(f, "{}_COMPLETE", action.label()),
            DeployState::Failed(action) => write!(f, "{}_FAILED", action.label()),
            DeployState::Canceled => f.write_str("CANCELED"),
        }
    }
}

impl Serialize for DeployState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Tunables of a deploy run
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Upper bound on backend calls in flight across all groups; unbounded
    /// when `None`
    pub max_concurrency: Option<usize>,
}

/// One recorded state change
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub at: DateTime<Utc>,
    pub group: usize,
    pub depth: usize,
    pub resource: ResourceId,
    pub state: DeployState,
}

/// Result of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group: usize,
    pub failed: Vec<ResourceId>,
    pub canceled: Vec<ResourceId>,
}

impl GroupOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything a deploy run produced
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub states: BTreeMap<ResourceId, DeployState>,
    pub outputs: BTreeMap<ResourceId, serde_json::Value>,
    pub errors: BTreeMap<ResourceId, String>,
    pub transitions: Vec<Transition>,
    pub groups: Vec<GroupOutcome>,
    /// Snapshot to persist
    pub snapshot: DeploySnapshot,
}

impl DeployReport {
    /// Report of a run with nothing to do
    pub fn unchanged(snapshot: DeploySnapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupOutcome::succeeded)
    }

    pub fn failed(&self) -> Vec<FailedResource> {
        self.states
            .iter()
            .filter_map(|(id, state)| match state {
                DeployState::Failed(action) => Some(FailedResource {
                    id: id.clone(),
                    action: *action,
                    error: self.errors.get(id).cloned().unwrap_or_default(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn canceled(&self) -> Vec<ResourceId> {
        self.states
            .iter()
            .filter(|(_, state)| **state == DeployState::Canceled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, DeployState::Complete(_)))
            .count()
    }

    /// `Aggregate` error if any group failed
    pub fn into_result(self) -> Result<Self, DeployError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DeployError::Aggregate {
                failed: self.failed(),
                canceled: self.canceled(),
            })
        }
    }
}

/// Runs a deploy plan against a provisioning backend
pub struct DeployOrchestrator {
    backend: Arc<dyn ProvisioningBackend>,
    options: DeployOptions,
}

impl DeployOrchestrator {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, options: DeployOptions) -> Self {
        Self { backend, options }
    }

    #[instrument(skip_all, fields(resources = plan.graph.len()))]
    pub async fn run(&self, plan: &DeployPlan) -> DeployReport {
        let limiter = self
            .options
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let groups = plan.changed_groups();
        info!(groups = groups.len(), "Deploying");

        let coordinators = groups.into_iter().map(|group| {
            GroupRun::new(plan, group, Arc::clone(&self.backend), limiter.clone()).run()
        });
        let finished = join_all(coordinators).await;

        let mut report = DeployReport::default();
        for run in finished {
            report.states.extend(run.states);
            report.outputs.extend(run.outputs);
            report.errors.extend(run.errors);
            report.transitions.extend(run.transitions);
            report.groups.push(run.outcome);
        }
        report.snapshot = build_snapshot(plan, &report.states, &report.outputs);

        info!(
            completed = report.completed(),
            failed = report.failed().len(),
            canceled = report.canceled().len(),
            "Deploy finished"
        );
        report
    }
}

/// Next snapshot after a run
///
/// Completed creates and updates record their current config and new output,
/// completed deletes drop out, and everything else (unchanged, failed,
/// canceled) keeps its previous entry.
pub fn build_snapshot(
    plan: &DeployPlan,
    states: &BTreeMap<ResourceId, DeployState>,
    outputs: &BTreeMap<ResourceId, serde_json::Value>,
) -> DeploySnapshot {
    let mut snapshot = plan.previous.clone();

    for (id, state) in states {
        match state {
            DeployState::Complete(Action::Create | Action::Update) => {
                if let Some(resource) = plan.current.get(id) {
                    let output = outputs.get(id).cloned().unwrap_or_default();
                    snapshot.insert(id.clone(), SnapshotEntry::from_resource(resource, output));
                }
            }
            DeployState::Complete(Action::Delete) => {
                snapshot.remove(id);
            }
            _ => {}
        }
    }

    snapshot
}

type TaskResult = (ResourceId, Result<serde_json::Value, ProvisionError>);

/// What a group coordinator hands back
struct GroupResult {
    states: BTreeMap<ResourceId, DeployState>,
    outputs: BTreeMap<ResourceId, serde_json::Value>,
    errors: BTreeMap<ResourceId, String>,
    transitions: Vec<Transition>,
    outcome: GroupOutcome,
}

/// Coordinator of one group; sole owner of its members' state
struct GroupRun<'a> {
    plan: &'a DeployPlan,
    group: usize,
    backend: Arc<dyn ProvisioningBackend>,
    limiter: Option<Arc<Semaphore>>,
    actions: BTreeMap<ResourceId, Action>,
    states: BTreeMap<ResourceId, DeployState>,
    outputs: BTreeMap<ResourceId, serde_json::Value>,
    errors: BTreeMap<ResourceId, String>,
    transitions: Vec<Transition>,
    tasks: JoinSet<TaskResult>,
    running: HashMap<task::Id, ResourceId>,
    canceled: bool,
}

impl<'a> GroupRun<'a> {
    fn new(
        plan: &'a DeployPlan,
        group: usize,
        backend: Arc<dyn ProvisioningBackend>,
        limiter: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            plan,
            group,
            backend,
            limiter,
            actions: BTreeMap::new(),
            states: BTreeMap::new(),
            outputs: BTreeMap::new(),
            errors: BTreeMap::new(),
            transitions: Vec::new(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            canceled: false,
        }
    }

    async fn run(mut self) -> GroupResult {
        self.enqueue_members();

        let wave = self.eligible();
        debug!(
            group = self.group,
            resources = ?wave.iter().map(ResourceId::as_str).collect::<Vec<_>>(),
            "Launching initial wave"
        );
        self.launch_eligible();
        self.drain().await;

        let stranded: Vec<ResourceId> = self.ids_in(DeployState::Pending);
        for id in stranded {
            warn!(group = self.group, resource = %id, "Resource was never eligible");
            self.set_state(&id, DeployState::Canceled);
        }

        let outcome = GroupOutcome {
            group: self.group,
            failed: self
                .states
                .iter()
                .filter(|(_, s)| matches!(s, DeployState::Failed(_)))
                .map(|(id, _)| id.clone())
                .collect(),
            canceled: self.ids_in(DeployState::Canceled),
        };
        if outcome.succeeded() {
            info!(group = self.group, "Group deployed");
        } else {
            warn!(
                group = self.group,
                failed = outcome.failed.len(),
                canceled = outcome.canceled.len(),
                "Group failed"
            );
        }

        GroupResult {
            states: self.states,
            outputs: self.outputs,
            errors: self.errors,
            transitions: self.transitions,
            outcome,
        }
    }

    /// Mark every changed member of the group pending
    fn enqueue_members(&mut self) {
        let members: Vec<(ResourceId, Action)> = self
            .plan
            .changed()
            .filter(|(id, _)| self.plan.graph.group(id) == Some(self.group))
            .map(|(id, action)| (id.clone(), action))
            .collect();

        for (id, action) in members {
            self.actions.insert(id.clone(), action);
            self.set_state(&id, DeployState::Pending);
        }
    }

    /// Collect finished tasks until none are left, launching what they unblock
    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, (id, result))) => {
                    self.running.remove(&task_id);
                    self.complete(id, result);
                }
                Err(e) => self.task_lost(e.id(), e.to_string()),
            }
            if !self.canceled {
                self.launch_eligible();
            }
        }
    }

    /// A task ended without reporting back
    fn task_lost(&mut self, task_id: task::Id, reason: String) {
        let Some(id) = self.running.remove(&task_id) else {
            error!(group = self.group, error = %reason, "Unknown resource task did not finish");
            return;
        };
        error!(group = self.group, resource = %id, error = %reason, "Resource task did not finish");
        if let Some(action) = self.actions.get(&id).copied() {
            self.fail(&id, action, format!("task did not finish: {}", reason));
        }
    }

    fn ids_in(&self, state: DeployState) -> Vec<ResourceId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn set_state(&mut self, id: &ResourceId, state: DeployState) {
        let depth = self.plan.graph.depth(id).unwrap_or_default();
        self.states.insert(id.clone(), state);
        info!(group = self.group, depth, resource = %id, state = %state, "Resource state changed");
        self.transitions.push(Transition {
            at: Utc::now(),
            group: self.group,
            depth,
            resource: id.clone(),
            state,
        });
    }

    /// Pending resources with nothing active in their dependency closure
    fn eligible(&self) -> Vec<ResourceId> {
        self.states
            .iter()
            .filter(|(_, state)| **state == DeployState::Pending)
            .filter(|(id, _)| {
                self.plan.graph.intermediates(id).is_none_or(|closure| {
                    closure
                        .iter()
                        .all(|dep| !self.states.get(dep).is_some_and(DeployState::is_active))
                })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn launch_eligible(&mut self) {
        for id in self.eligible() {
            if self.canceled {
                break;
            }
            self.launch(id);
        }
    }

    fn launch(&mut self, id: ResourceId) {
        let Some(action) = self.actions.get(&id).copied() else {
            return;
        };
        let Some(request) = self.plan.request(&id, action) else {
            self.fail(&id, action, "no config to provision with".to_string());
            return;
        };

        self.set_state(&id, DeployState::InProgress(action));

        let backend = Arc::clone(&self.backend);
        let limiter = self.limiter.clone();
        let task_id = id.clone();
        let handle = self.tasks.spawn(async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            let result = AssertUnwindSafe(backend.provision(request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ProvisionError::Panicked(panic_message(panic))));
            (id, result)
        });
        self.running.insert(handle.id(), task_id);
    }

    fn complete(&mut self, id: ResourceId, result: Result<serde_json::Value, ProvisionError>) {
        let Some(action) = self.actions.get(&id).copied() else {
            return;
        };
        match result {
            Ok(output) => {
                self.outputs.insert(id.clone(), output);
                self.set_state(&id, DeployState::Complete(action));
            }
            Err(err) => self.fail(&id, action, err.to_string()),
        }
    }

    fn fail(&mut self, id: &ResourceId, action: Action, error: String) {
        warn!(group = self.group, resource = %id, error = %error, "Provisioning failed");
        self.errors.insert(id.clone(), error);
        self.set_state(id, DeployState::Failed(action));
        self.cancel_pending();
    }

    /// Cancel every pending member, once
    fn cancel_pending(&mut self) {
        if self.canceled {
            return;
        }
        self.canceled = true;
        for id in self.ids_in(DeployState::Pending) {
            self.set_state(&id, DeployState::Canceled);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProvisionRequest;
    use async_trait::async_trait;
    use gasoline_core::{Resource, ResourceConfig, ResourceMap};
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(raw: &str) -> ResourceId {
        ResourceId::parse(raw).unwrap()
    }

    fn kv(name: &str) -> String {
        format!("test:{}:cloudflare-kv:1", name)
    }

    fn resource(name: &str, deps: &[&str]) -> Resource {
        let rid = id(&kv(name));
        let config = ResourceConfig::new(json!({ "type": "cloudflare-kv", "name": name }));
        Resource::new(rid, config, deps.iter().map(|d| id(&kv(d)))).unwrap()
    }

    fn resources(list: Vec<Resource>) -> ResourceMap {
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn entry(resource: &Resource, output: serde_json::Value) -> SnapshotEntry {
        SnapshotEntry::from_resource(resource, output)
    }

    /// Records calls, fails on request, tracks concurrency
    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<(ResourceId, Action)>>,
        fail: BTreeSet<ResourceId>,
        panic: BTreeSet<ResourceId>,
        delays: BTreeMap<ResourceId, u64>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockBackend {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|n| id(&kv(n))).collect(),
                ..Default::default()
            }
        }

        fn with_delay(mut self, name: &str, millis: u64) -> Self {
            self.delays.insert(id(&kv(name)), millis);
            self
        }

        fn called(&self) -> BTreeSet<ResourceId> {
            self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl ProvisioningBackend for MockBackend {
        fn supports(&self, _key: &crate::action::HandlerKey) -> bool {
            true
        }

        async fn provision(
            &self,
            request: ProvisionRequest,
        ) -> Result<serde_json::Value, ProvisionError> {
            self.calls
                .lock()
                .unwrap()
                .push((request.id.clone(), request.key.action));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(&request.id).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic.contains(&request.id) {
                panic!("handler exploded");
            }
            if self.fail.contains(&request.id) {
                return Err(ProvisionError::ApiError("boom".to_string()));
            }
            Ok(json!({ "id": request.config.name() }))
        }
    }

    async fn run(plan: &DeployPlan, backend: Arc<MockBackend>, options: DeployOptions) -> DeployReport {
        DeployOrchestrator::new(backend, options).run(plan).await
    }

    /// No resource may start while anything in its closure is active
    fn assert_gating(plan: &DeployPlan, report: &DeployReport) {
        let mut states: BTreeMap<ResourceId, DeployState> = BTreeMap::new();
        for t in &report.transitions {
            if let DeployState::InProgress(_) = t.state {
                for dep in plan.graph.intermediates(&t.resource).unwrap() {
                    if let Some(state) = states.get(dep) {
                        assert!(
                            state.is_terminal(),
                            "{} started while {} was {}",
                            t.resource,
                            dep,
                            state
                        );
                    }
                }
            }
            states.insert(t.resource.clone(), t.state);
        }
    }

    #[tokio::test]
    async fn test_deploy_chain_in_dependency_order() {
        let current = resources(vec![
            resource("api", &["kv"]),
            resource("kv", &["base"]),
            resource("base", &[]),
        ]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend::default());

        let report = run(&plan, backend.clone(), DeployOptions::default()).await;

        assert!(report.is_success());
        let order: Vec<ResourceId> = backend.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(order, vec![id(&kv("base")), id(&kv("kv")), id(&kv("api"))]);
        assert_eq!(report.states[&id(&kv("api"))], DeployState::Complete(Action::Create));
        assert_eq!(report.snapshot.len(), 3);
        assert_eq!(report.snapshot.output(&id(&kv("kv"))), Some(&json!({ "id": "kv" })));
        assert_gating(&plan, &report);
    }

    #[tokio::test]
    async fn test_aborted_task_fails_its_resource() {
        let current = resources(vec![resource("api", &["kv"]), resource("kv", &[])]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend::default().with_delay("kv", 10_000));
        let group = plan.graph.group(&id(&kv("kv"))).unwrap();

        let mut coordinator = GroupRun::new(&plan, group, backend, None);
        coordinator.enqueue_members();
        coordinator.launch_eligible();
        assert_eq!(coordinator.running.len(), 1);

        coordinator.tasks.abort_all();
        coordinator.drain().await;

        assert_eq!(coordinator.states[&id(&kv("kv"))], DeployState::Failed(Action::Create));
        assert_eq!(coordinator.states[&id(&kv("api"))], DeployState::Canceled);
        assert!(coordinator.errors[&id(&kv("kv"))].starts_with("task did not finish"));
        assert!(coordinator.running.is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_middle_still_gates() {
        // A -> B -> C with B unchanged: A must wait for C
        let a = resource("a", &["b"]);
        let b = resource("b", &["c"]);
        let c = resource("c", &[]);

        let mut previous = DeploySnapshot::new();
        previous.insert(b.id.clone(), entry(&b, json!({ "id": "b" })));

        let plan = DeployPlan::build(resources(vec![a, b, c]), previous).unwrap();
        let backend = Arc::new(MockBackend::default().with_delay("c", 30));

        let report = run(&plan, backend.clone(), DeployOptions::default()).await;

        assert!(report.is_success());
        assert!(!backend.called().contains(&id(&kv("b"))));
        let calls: Vec<ResourceId> = backend.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(calls, vec![id(&kv("c")), id(&kv("a"))]);
        assert!(!report.states.contains_key(&id(&kv("b"))));
        assert_gating(&plan, &report);
    }

    #[tokio::test]
    async fn test_failure_cancels_pending_in_group() {
        // l1, l2 start together; m1, m2 wait on both; top waits on m1, m2
        let current = resources(vec![
            resource("l1", &[]),
            resource("l2", &[]),
            resource("m1", &["l1", "l2"]),
            resource("m2", &["l1", "l2"]),
            resource("top", &["m1", "m2"]),
        ]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend::failing(&["l1"]).with_delay("l2", 20));

        let report = run(&plan, backend.clone(), DeployOptions::default()).await;

        assert!(!report.is_success());
        assert_eq!(report.states[&id(&kv("l1"))], DeployState::Failed(Action::Create));
        assert_eq!(report.states[&id(&kv("l2"))], DeployState::Complete(Action::Create));
        assert_eq!(
            report.canceled(),
            vec![id(&kv("m1")), id(&kv("m2")), id(&kv("top"))]
        );
        assert_eq!(
            backend.called(),
            [id(&kv("l1")), id(&kv("l2"))].into_iter().collect::<BTreeSet<_>>()
        );

        // canceled exactly once, never started
        for name in ["m1", "m2", "top"] {
            let rid = id(&kv(name));
            let seen: Vec<DeployState> = report
                .transitions
                .iter()
                .filter(|t| t.resource == rid)
                .map(|t| t.state)
                .collect();
            assert_eq!(seen, vec![DeployState::Pending, DeployState::Canceled]);
        }

        match report.into_result() {
            Err(DeployError::Aggregate { failed, canceled }) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].error, "API error: boom");
                assert_eq!(canceled.len(), 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_cross_groups() {
        let current = resources(vec![
            resource("a-top", &["a-base"]),
            resource("a-base", &[]),
            resource("b-top", &["b-base"]),
            resource("b-base", &[]),
        ]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend::failing(&["a-base"]));

        let report = run(&plan, backend, DeployOptions::default()).await;

        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.states[&id(&kv("a-top"))], DeployState::Canceled);
        assert_eq!(report.states[&id(&kv("b-top"))], DeployState::Complete(Action::Create));
        assert_eq!(report.groups.iter().filter(|g| g.succeeded()).count(), 1);
    }

    #[tokio::test]
    async fn test_shallow_isolated_resource_starts_in_first_wave() {
        // top -> mid -> base, side -> base; base unchanged
        let current = resources(vec![
            resource("top", &["mid"]),
            resource("mid", &["base"]),
            resource("base", &[]),
            resource("side", &["base"]),
        ]);
        let base = current[&id(&kv("base"))].clone();
        let mut previous = DeploySnapshot::new();
        previous.insert(base.id.clone(), entry(&base, json!({})));

        let plan = DeployPlan::build(current, previous).unwrap();
        assert!(plan.graph.depth(&id(&kv("side"))) < plan.graph.depth(&id(&kv("mid"))));

        let backend = Arc::new(
            MockBackend::default()
                .with_delay("mid", 30)
                .with_delay("side", 30),
        );
        let report = run(&plan, backend.clone(), DeployOptions::default()).await;

        assert!(report.is_success());
        // side does not wait for the deeper mid wave
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 2);
        let calls: Vec<ResourceId> = backend.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(calls.last(), Some(&id(&kv("top"))));
        assert_gating(&plan, &report);
    }

    #[tokio::test]
    async fn test_snapshot_rules() {
        let updated_ok = resource("updated-ok", &[]);
        let updated_bad = resource("updated-bad", &[]);
        let same = resource("same", &[]);
        let created_ok = resource("created-ok", &[]);
        let created_bad = resource("created-bad", &[]);
        let deleted = resource("deleted", &[]);

        let mut previous = DeploySnapshot::new();
        let old = |r: &Resource| {
            let mut e = entry(r, json!({ "id": "old" }));
            e.config = ResourceConfig::new(json!({ "type": "cloudflare-kv", "name": "OLD" }));
            e
        };
        previous.insert(updated_ok.id.clone(), old(&updated_ok));
        previous.insert(updated_bad.id.clone(), old(&updated_bad));
        previous.insert(same.id.clone(), entry(&same, json!({ "id": "same" })));
        previous.insert(deleted.id.clone(), entry(&deleted, json!({ "id": "gone" })));

        let current = resources(vec![
            updated_ok.clone(),
            updated_bad.clone(),
            same.clone(),
            created_ok.clone(),
            created_bad.clone(),
        ]);
        let plan = DeployPlan::build(current, previous.clone()).unwrap();
        let backend = Arc::new(MockBackend::failing(&["updated-bad", "created-bad"]));

        let report = run(&plan, backend, DeployOptions::default()).await;
        let snapshot = &report.snapshot;

        assert_eq!(snapshot.get(&updated_ok.id), Some(&entry(&updated_ok, json!({ "id": "updated-ok" }))));
        assert_eq!(snapshot.get(&updated_bad.id), previous.get(&updated_bad.id));
        assert_eq!(snapshot.get(&same.id), previous.get(&same.id));
        assert!(snapshot.get(&created_ok.id).is_some());
        assert!(snapshot.get(&created_bad.id).is_none());
        assert!(snapshot.get(&deleted.id).is_none());
        assert_eq!(report.states[&deleted.id], DeployState::Complete(Action::Delete));
    }

    #[tokio::test]
    async fn test_delete_receives_recorded_output() {
        let gone = resource("gone", &[]);
        let mut previous = DeploySnapshot::new();
        previous.insert(gone.id.clone(), entry(&gone, json!({ "id": "ns-1" })));

        struct Capture(Mutex<Option<ProvisionRequest>>);

        #[async_trait]
        impl ProvisioningBackend for Capture {
            fn supports(&self, _key: &crate::action::HandlerKey) -> bool {
                true
            }

            async fn provision(
                &self,
                request: ProvisionRequest,
            ) -> Result<serde_json::Value, ProvisionError> {
                *self.0.lock().unwrap() = Some(request);
                Ok(json!({}))
            }
        }

        let plan = DeployPlan::build(ResourceMap::new(), previous).unwrap();
        let backend = Arc::new(Capture(Mutex::new(None)));
        let report = DeployOrchestrator::new(backend.clone(), DeployOptions::default())
            .run(&plan)
            .await;

        assert!(report.snapshot.is_empty());
        let request = backend.0.lock().unwrap().take().unwrap();
        assert_eq!(request.key.action, Action::Delete);
        assert_eq!(request.previous_output, Some(json!({ "id": "ns-1" })));
        assert_eq!(request.config.name(), Some("gone"));
    }

    #[tokio::test]
    async fn test_max_concurrency() {
        let current = resources(vec![
            resource("a", &[]),
            resource("b", &[]),
            resource("c", &[]),
            resource("d", &[]),
        ]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend::default());

        let report = run(
            &plan,
            backend.clone(),
            DeployOptions {
                max_concurrency: Some(1),
            },
        )
        .await;

        assert!(report.is_success());
        assert_eq!(backend.calls.lock().unwrap().len(), 4);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_a_failure() {
        let current = resources(vec![resource("top", &["base"]), resource("base", &[])]);
        let plan = DeployPlan::build(current, DeploySnapshot::new()).unwrap();
        let backend = Arc::new(MockBackend {
            panic: [id(&kv("base"))].into_iter().collect(),
            ..Default::default()
        });

        let report = run(&plan, backend, DeployOptions::default()).await;

        assert_eq!(report.states[&id(&kv("base"))], DeployState::Failed(Action::Create));
        assert!(report.errors[&id(&kv("base"))].contains("handler exploded"));
        assert_eq!(report.states[&id(&kv("top"))], DeployState::Canceled);
    }

    #[tokio::test]
    async fn test_no_changes_runs_nothing() {
        let base = resource("base", &[]);
        let mut previous = DeploySnapshot::new();
        previous.insert(base.id.clone(), entry(&base, json!({})));

        let plan = DeployPlan::build(resources(vec![base]), previous.clone()).unwrap();
        let backend = Arc::new(MockBackend::default());

        let report = run(&plan, backend.clone(), DeployOptions::default()).await;

        assert!(report.is_success());
        assert!(report.groups.is_empty());
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(report.snapshot, previous);
    }

    #[test]
    fn test_deploy_state_labels() {
        assert_eq!(DeployState::Pending.to_string(), "PENDING");
        assert_eq!(DeployState::InProgress(Action::Create).to_string(), "CREATE_IN_PROGRESS");
        assert_eq!(DeployState::Complete(Action::Update).to_string(), "UPDATE_COMPLETE");
        assert_eq!(DeployState::Failed(Action::Delete).to_string(), "DELETE_FAILED");
        assert_eq!(DeployState::Canceled.to_string(), "CANCELED");
        assert_eq!(
            serde_json::to_string(&DeployState::InProgress(Action::Delete)).unwrap(),
            r#""DELETE_IN_PROGRESS""#
        );
        assert!(DeployState::Pending.is_active());
        assert!(DeployState::Canceled.is_terminal());
    }
}
