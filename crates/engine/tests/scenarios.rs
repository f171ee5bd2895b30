//! End-to-end plan scenarios against a scripted executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use rstest::rstest;
use steward_core::{ParamKind, Params, TargetKind, TargetLock};
use steward_engine::{EngineError, HealthStatus, Orchestrator, OrchestratorConfig};
use steward_execution::{
    AttemptKind, ExecutionRecord, FailureCategory, JournalEntry, OutputSnapshot, PlanStatus,
    ReviewReason, StepFlag, StepStatus,
};
use steward_journal::{FileJournal, Journal, MemoryJournal};
use steward_plan::catalog::{CatalogConfig, names, standard_registry};
use steward_plan::{
    CommandTemplate, LockScope, MaintenanceTask, Operation, OperationRegistry,
    OperationRegistryBuilder, PlanBuilder, PlanDefinition, PlanError, PlanTemplate, Probe,
    TaskKind,
};
use steward_resilience::{BackoffPolicy, RetryPolicy};
use steward_runtime::{CallKind, Failure, Outcome, ScriptedExecutor};
use tokio_util::sync::CancellationToken;

fn kubectl(name: &str, args: &[&str]) -> Operation {
    Operation::new(
        name,
        TargetKind::ClusterApi,
        CommandTemplate::new("kubectl").args(args.iter().copied()),
    )
    .param("node", ParamKind::String)
    .lock(LockScope::Node, "node")
}

fn registry() -> Arc<OperationRegistry> {
    let mut builder = OperationRegistryBuilder::new();
    let operations = [
        kubectl("cordon-node", &["cordon", "{node}"])
            .idempotent()
            .compensated_by("uncordon-node"),
        kubectl("uncordon-node", &["uncordon", "{node}"]).idempotent(),
        kubectl("label-node", &["label", "node", "{node}", "steward.io/maintenance=true"])
            .idempotent()
            .compensated_by("unlabel-node"),
        kubectl("unlabel-node", &["label", "node", "{node}", "steward.io/maintenance-"]).idempotent(),
        kubectl("verify-node-ready", &["get", "node", "{node}"]).idempotent(),
        kubectl("evict-pods", &["drain", "{node}", "--ignore-daemonsets"]).idempotent(),
        kubectl("remove-node", &["delete", "node", "{node}"]).reconcile_with(Probe::exit_non_zero(
            CommandTemplate::new("kubectl").args(["get", "node", "{node}"]),
        )),
        kubectl("delete-lease", &["delete", "lease", "{node}", "-n", "kube-node-lease"]),
        Operation::new(
            "etcd-defrag",
            TargetKind::Etcd,
            CommandTemplate::new("etcdctl").args(["defrag", "--endpoints", "{member}"]),
        )
        .idempotent()
        .param("member", ParamKind::String)
        .lock(LockScope::EtcdMember, "member"),
        Operation::new(
            "mount-volume",
            TargetKind::Host,
            CommandTemplate::new("mount").args(["{device}", "{path}"]),
        )
        .idempotent()
        .param("device", ParamKind::String)
        .param("path", ParamKind::String)
        .precondition(Probe::exit_zero(
            CommandTemplate::new("test").args(["-b", "{device}"]),
        ))
        .lock(LockScope::Mount, "path"),
    ];
    for operation in operations {
        builder.register(operation).unwrap();
    }
    Arc::new(builder.build().unwrap())
}

fn config(attempts: u32) -> OrchestratorConfig {
    OrchestratorConfig::default().with_retry(RetryPolicy::new(attempts, BackoffPolicy::immediate()))
}

fn node(name: &str) -> Params {
    Params::new().with("node", name)
}

fn member(name: &str) -> Params {
    Params::new().with("member", name)
}

struct Harness {
    executor: Arc<ScriptedExecutor>,
    journal: Arc<MemoryJournal>,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn new(config: OrchestratorConfig) -> Self {
        Self::with_executor(ScriptedExecutor::new(), config)
    }

    fn with_executor(executor: ScriptedExecutor, config: OrchestratorConfig) -> Self {
        let executor = Arc::new(executor);
        let journal = Arc::new(MemoryJournal::new());
        let orchestrator = Orchestrator::new(
            registry(),
            Arc::clone(&executor) as _,
            Arc::clone(&journal) as _,
            config,
        )
        .unwrap();
        Self {
            executor,
            journal,
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn plan(&self, template: &PlanTemplate) -> PlanDefinition {
        let task = MaintenanceTask::new("test-request", TaskKind::DrainNode);
        PlanBuilder::new(self.orchestrator.registry())
            .build_from_template(&task, template)
            .unwrap()
    }

    fn closed_records(&self, definition: &PlanDefinition) -> Vec<ExecutionRecord> {
        self.journal
            .entries(definition.id)
            .unwrap()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Attempt { record, .. } if !record.is_open() => Some(record),
                _ => None,
            })
            .collect()
    }

    fn plan_transitions(&self, definition: &PlanDefinition) -> Vec<(PlanStatus, PlanStatus)> {
        self.journal
            .entries(definition.id)
            .unwrap()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::PlanTransitioned { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

fn answered_not_found() -> Outcome {
    Outcome::Fatal(
        Failure::new(FailureCategory::NotFound, "node \"w1\" not found")
            .with_output(OutputSnapshot::capture(Some(1), "", "NotFound")),
    )
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let h = Harness::new(config(5));
    h.executor
        .then("evict-pods", CallKind::Action, Outcome::retryable(FailureCategory::Network, "connection refused"))
        .then("evict-pods", CallKind::Action, Outcome::retryable(FailureCategory::Conflict, "object modified"));
    let def = h.plan(
        &PlanTemplate::new("decommission")
            .then("cordon", "cordon-node", node("w1"))
            .then("evict", "evict-pods", node("w1"))
            .then("remove", "remove-node", node("w1")),
    );

    let report = h.orchestrator.execute(def.clone(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(h.executor.count("cordon-node", CallKind::Action), 1);
    assert_eq!(h.executor.count("evict-pods", CallKind::Action), 3);
    assert_eq!(h.executor.count("remove-node", CallKind::Action), 1);
    assert_eq!(report.step("evict").unwrap().attempts, 3);

    let records = h.closed_records(&def);
    assert_eq!(records.len(), 5);
    let evict: Vec<_> = records.iter().filter(|r| r.step.index == 1).collect();
    assert_eq!(
        evict.iter().map(|r| r.outcome.as_ref().unwrap().label()).collect::<Vec<_>>(),
        vec!["retryable", "retryable", "succeeded"]
    );
    assert_eq!(evict.iter().map(|r| r.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    let keys: std::collections::HashSet<_> = evict.iter().map(|r| r.idempotency_key.clone()).collect();
    assert_eq!(keys.len(), 3);
    // The last step starts only after the retried one succeeded.
    let evicted = h.executor.calls_of("evict-pods", CallKind::Action)[2].finished;
    assert!(evicted <= h.executor.calls_of("remove-node", CallKind::Action)[0].started);

    assert_eq!(
        h.plan_transitions(&def),
        vec![
            (PlanStatus::Building, PlanStatus::Executing),
            (PlanStatus::Executing, PlanStatus::Succeeded),
        ]
    );
}

#[tokio::test]
async fn exhausted_budget_fails_the_step() {
    let h = Harness::new(config(2));
    for _ in 0..2 {
        h.executor.then(
            "verify-node-ready",
            CallKind::Action,
            Outcome::retryable(FailureCategory::Network, "connection refused"),
        );
    }
    let def = h.plan(&PlanTemplate::new("verify").then("verify", "verify-node-ready", node("w1")));

    let report = h.orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::RolledBack);
    let step = report.step("verify").unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.attempts, 2);
}

#[rstest]
#[case::clean_rollback(Outcome::ok(), PlanStatus::RolledBack, StepStatus::Compensated)]
#[case::failed_compensation(
    Outcome::fatal(FailureCategory::Forbidden, "uncordon forbidden"),
    PlanStatus::NeedsOperatorReview,
    StepStatus::Succeeded
)]
#[tokio::test]
async fn failure_compensates_in_reverse_order(
    #[case] uncordon: Outcome,
    #[case] expected: PlanStatus,
    #[case] cordon_status: StepStatus,
) {
    let h = Harness::new(config(3));
    h.executor
        .then("remove-node", CallKind::Action, Outcome::fatal(FailureCategory::Forbidden, "forbidden"))
        .then("uncordon-node", CallKind::Compensation, uncordon);
    let def = h.plan(
        &PlanTemplate::new("rollback")
            .then("cordon", "cordon-node", node("w1"))
            .then("label", "label-node", node("w1"))
            .then("remove", "remove-node", node("w1")),
    );

    let report = h.orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), expected);
    assert_eq!(report.step_status(2), Some(StepStatus::Failed));
    assert_eq!(report.step_status(1), Some(StepStatus::Compensated));
    assert_eq!(report.step_status(0), Some(cordon_status));

    let compensations: Vec<_> = h
        .executor
        .calls()
        .into_iter()
        .filter(|c| c.call == CallKind::Compensation)
        .map(|c| c.operation)
        .collect();
    assert_eq!(compensations, vec!["unlabel-node", "uncordon-node"]);

    if expected == PlanStatus::NeedsOperatorReview {
        let uncompensated = report.uncompensated();
        assert_eq!(uncompensated.len(), 1);
        assert_eq!(uncompensated[0].key, "cordon");
    }
}

#[tokio::test]
async fn step_without_compensation_is_flagged_on_rollback() {
    let h = Harness::new(config(1));
    h.executor.then(
        "remove-node",
        CallKind::Action,
        Outcome::fatal(FailureCategory::Forbidden, "forbidden"),
    );
    let def = h.plan(
        &PlanTemplate::new("rollback")
            .then("verify", "verify-node-ready", node("w1"))
            .then("remove", "remove-node", node("w1")),
    );

    let report = h.orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::NeedsOperatorReview);
    assert_eq!(report.step_status(0), Some(StepStatus::Succeeded));
    assert!(matches!(
        report.step("verify").unwrap().flags.as_slice(),
        [StepFlag::Uncompensated { .. }]
    ));
    assert_eq!(h.executor.calls_of("verify-node-ready", CallKind::Compensation).len(), 0);
}

#[tokio::test]
async fn dependents_of_a_failed_step_are_abandoned() {
    let h = Harness::new(config(1));
    h.executor.then(
        "cordon-node",
        CallKind::Action,
        Outcome::fatal(FailureCategory::Forbidden, "forbidden"),
    );
    let def = h.plan(
        &PlanTemplate::new("abandon")
            .then("cordon", "cordon-node", node("w1"))
            .then("verify", "verify-node-ready", node("w1")),
    );

    let report = h.orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::RolledBack);
    assert_eq!(report.step_status(1), Some(StepStatus::Abandoned));
    assert_eq!(h.executor.count("verify-node-ready", CallKind::Action), 0);
}

async fn interrupted_plan(h: &Harness, operation: &str) -> PlanDefinition {
    let def = h.plan(&PlanTemplate::new("remove").then("remove", operation, node("w1")));
    h.journal.create(&def).await.unwrap();
    h.journal
        .append(def.id, &JournalEntry::step_transitioned(0, StepStatus::Pending, StepStatus::Running, None))
        .await
        .unwrap();
    let open = ExecutionRecord::open(def.step_id(0), operation, AttemptKind::Action, 1)
        .with_command("kubectl delete node w1");
    h.journal
        .append(def.id, &JournalEntry::Attempt { timestamp: Utc::now(), record: open })
        .await
        .unwrap();
    def
}

#[tokio::test]
async fn interrupted_attempt_without_check_needs_review() {
    let h = Harness::new(config(5));
    let def = interrupted_plan(&h, "delete-lease").await;

    let report = h.orchestrator.resume(def.id, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::NeedsOperatorReview);
    assert!(h.executor.calls().is_empty());
    let step = report.step("remove").unwrap();
    assert_eq!(step.status, StepStatus::Running);
    assert!(matches!(
        step.flags.as_slice(),
        [StepFlag::NeedsReview { reason: ReviewReason::InterruptedAttempt, .. }]
    ));
    let records = h.closed_records(&def);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome.as_ref().unwrap().label(), "interrupted");
}

#[tokio::test]
async fn interrupted_attempt_is_reconciled_on_resume() {
    let h = Harness::new(config(5));
    h.executor.then("remove-node", CallKind::Reconciliation, answered_not_found());
    let def = interrupted_plan(&h, "remove-node").await;

    let report = h.orchestrator.resume(def.id, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(h.executor.count("remove-node", CallKind::Action), 0);
    assert_eq!(h.executor.count("remove-node", CallKind::Reconciliation), 1);
    let labels: Vec<_> = h
        .closed_records(&def)
        .iter()
        .map(|r| (r.kind, r.outcome.as_ref().unwrap().label()))
        .collect();
    assert_eq!(
        labels,
        vec![
            (AttemptKind::Action, "interrupted"),
            (AttemptKind::Reconciliation, "applied"),
        ]
    );
}

#[tokio::test]
async fn interrupted_idempotent_attempt_is_simply_retried() {
    let h = Harness::new(config(5));
    let def = interrupted_plan(&h, "cordon-node").await;

    let report = h.orchestrator.resume(def.id, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    let calls = h.executor.calls_of("cordon-node", CallKind::Action);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].attempt, 2);
}

#[tokio::test]
async fn timeout_without_check_is_never_retried() {
    let h = Harness::new(config(5));
    h.executor.then(
        "delete-lease",
        CallKind::Action,
        Outcome::retryable(FailureCategory::Timeout, "timed out after 30s"),
    );
    let def = h.plan(&PlanTemplate::new("lease").then("lease", "delete-lease", node("w1")));

    let report = h.orchestrator.execute(def.clone(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::NeedsOperatorReview);
    assert_eq!(h.executor.count("delete-lease", CallKind::Action), 1);
    assert_eq!(report.ambiguous().len(), 1);
    assert_eq!(h.closed_records(&def)[0].outcome.as_ref().unwrap().label(), "ambiguous");
    assert_eq!(h.orchestrator.board().health().status, HealthStatus::Degraded);
    assert_eq!(h.orchestrator.board().health().needs_review, vec![def.id]);
}

#[rstest]
#[case::applied(answered_not_found(), 1)]
#[case::not_applied(Outcome::ok(), 2)]
#[tokio::test]
async fn timeout_is_resolved_by_reconciliation(#[case] check: Outcome, #[case] actions: usize) {
    let h = Harness::new(config(5));
    h.executor
        .then(
            "remove-node",
            CallKind::Action,
            Outcome::retryable(FailureCategory::Timeout, "timed out after 30s"),
        )
        .then("remove-node", CallKind::Reconciliation, check);
    let def = h.plan(&PlanTemplate::new("remove").then("remove", "remove-node", node("w1")));

    let report = h.orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(h.executor.count("remove-node", CallKind::Action), actions);
    assert_eq!(h.executor.count("remove-node", CallKind::Reconciliation), 1);
}

fn catalog_harness() -> (Arc<ScriptedExecutor>, Orchestrator) {
    let executor = Arc::new(ScriptedExecutor::new());
    let registry = standard_registry(&CatalogConfig::default()).unwrap();
    let orchestrator =
        Orchestrator::new(Arc::new(registry), Arc::clone(&executor) as _, Arc::new(MemoryJournal::new()) as _, config(3))
            .unwrap();
    (executor, orchestrator)
}

fn mount_plan(orchestrator: &Orchestrator) -> PlanDefinition {
    let params = Params::new()
        .with("device", "/dev/sdb1")
        .with("path", "/var/lib/data");
    PlanBuilder::new(orchestrator.registry())
        .build_from_template(
            &MaintenanceTask::new("mount", TaskKind::DrainNode),
            &PlanTemplate::new("mount").then("mount", names::MOUNT_VOLUME, params),
        )
        .unwrap()
}

fn exited(code: i32) -> Outcome {
    Outcome::Fatal(
        Failure::new(FailureCategory::Unknown, format!("exit status {code}"))
            .with_output(OutputSnapshot::capture(Some(code), "", "")),
    )
}

#[rstest]
#[case::mounted(Outcome::ok(), 1)]
#[case::not_mounted(exited(1), 2)]
#[tokio::test]
async fn host_mount_timeout_asks_findmnt_before_retrying(#[case] check: Outcome, #[case] actions: usize) {
    let (executor, orchestrator) = catalog_harness();
    executor
        .then(
            names::MOUNT_VOLUME,
            CallKind::Action,
            Outcome::retryable(FailureCategory::Timeout, "timed out after 120s"),
        )
        .then(names::MOUNT_VOLUME, CallKind::Reconciliation, check);
    let def = mount_plan(&orchestrator);

    let report = orchestrator.execute(def, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(executor.count(names::MOUNT_VOLUME, CallKind::Action), actions);
    assert_eq!(executor.count(names::MOUNT_VOLUME, CallKind::Reconciliation), 1);
    let reconcile = &executor.calls_of(names::MOUNT_VOLUME, CallKind::Reconciliation)[0];
    assert!(reconcile.command.to_string().starts_with("findmnt"));
}

#[tokio::test]
async fn interrupted_mount_is_reconciled_not_rerun() {
    let executor = Arc::new(ScriptedExecutor::new());
    let journal = Arc::new(MemoryJournal::new());
    let orchestrator = Orchestrator::new(
        Arc::new(standard_registry(&CatalogConfig::default()).unwrap()),
        Arc::clone(&executor) as _,
        Arc::clone(&journal) as _,
        config(3),
    )
    .unwrap();
    let def = mount_plan(&orchestrator);
    journal.create(&def).await.unwrap();
    journal
        .append(def.id, &JournalEntry::step_transitioned(0, StepStatus::Pending, StepStatus::Running, None))
        .await
        .unwrap();
    let open = ExecutionRecord::open(def.step_id(0), names::MOUNT_VOLUME, AttemptKind::Action, 1);
    journal
        .append(def.id, &JournalEntry::Attempt { timestamp: Utc::now(), record: open })
        .await
        .unwrap();

    let report = orchestrator.resume(def.id, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(executor.count(names::MOUNT_VOLUME, CallKind::Action), 0);
    assert_eq!(executor.count(names::MOUNT_VOLUME, CallKind::Reconciliation), 1);
}

#[tokio::test]
async fn unmet_precondition_blocks_the_call_until_it_holds() {
    let h = Harness::new(config(3));
    h.executor.then(
        "mount-volume",
        CallKind::Precondition,
        Outcome::Fatal(
            Failure::new(FailureCategory::Unknown, "exit status 1")
                .with_output(OutputSnapshot::capture(Some(1), "", "")),
        ),
    );
    let params = Params::new()
        .with("device", "/dev/sdb1")
        .with("path", "/var/lib/data");
    let def = h.plan(&PlanTemplate::new("mount").then("mount", "mount-volume", params));

    let report = h.orchestrator.execute(def.clone(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), PlanStatus::Succeeded);
    assert_eq!(h.executor.count("mount-volume", CallKind::Precondition), 2);
    assert_eq!(h.executor.count("mount-volume", CallKind::Action), 1);
    let records = h.closed_records(&def);
    assert!(matches!(
        records[0].outcome,
        Some(steward_execution::AttemptOutcome::Failed {
            category: FailureCategory::PreconditionUnmet,
            retryable: true,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn calls_on_one_target_never_overlap() {
    let executor = ScriptedExecutor::new().with_default_delay(Duration::from_millis(200));
    let h = Harness::with_executor(executor, config(3).with_max_concurrency(8));
    let template = PlanTemplate::new("defrag")
        .step("m1-a", "etcd-defrag", member("m1"), Vec::<String>::new())
        .step("m1-b", "etcd-defrag", member("m1"), Vec::<String>::new())
        .step("m2", "etcd-defrag", member("m2"), Vec::<String>::new());
    let first = h.plan(&template);
    let second = h.plan(&template);

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        h.orchestrator.execute(first, &cancel),
        h.orchestrator.execute(second, &cancel),
    );
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());

    let calls = h.executor.calls();
    assert_eq!(calls.len(), 6);
    let on_m1: Vec<_> = calls
        .iter()
        .filter(|c| c.command.to_string().ends_with("m1"))
        .collect();
    assert_eq!(on_m1.len(), 4);
    for pair in on_m1.windows(2) {
        assert!(pair[0].finished <= pair[1].started, "calls on etcd/m1 overlapped");
    }
    // m2 runs alongside the first m1 call.
    let on_m2 = calls.iter().find(|c| c.command.to_string().ends_with("m2")).unwrap();
    assert!(on_m2.started < on_m1[0].finished);
    assert!(!h.orchestrator.locks().is_held(&TargetLock::etcd_member("m1").unwrap()));
}

#[tokio::test]
async fn dependency_against_same_lock_order_is_refused() {
    let h = Harness::new(config(3));
    let mut def = h.plan(
        &PlanTemplate::new("cordon")
            .step("cordon", "cordon-node", node("w1"), Vec::<String>::new())
            .step("label", "label-node", node("w1"), Vec::<String>::new()),
    );
    // cordon waits for label, but label is declared after it on node/w1.
    def.steps[0].depends_on = vec![1];

    let err = h.orchestrator.execute(def.clone(), &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, EngineError::Plan(PlanError::CyclicPlan)));
    assert!(h.executor.calls().is_empty());
    assert!(h.journal.entries(def.id).is_none());

    let template = PlanTemplate::new("cordon")
        .step("cordon", "cordon-node", node("w1"), ["label"])
        .step("label", "label-node", node("w1"), Vec::<String>::new());
    let built = PlanBuilder::new(h.orchestrator.registry())
        .build_from_template(&MaintenanceTask::new("r", TaskKind::DrainNode), &template);
    assert_eq!(built.unwrap_err(), PlanError::CyclicPlan);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_new_steps_and_rolls_back() {
    let h = Harness::new(config(3));
    h.executor.then_after(
        "label-node",
        CallKind::Action,
        Duration::from_secs(10),
        Outcome::ok(),
    );
    let def = h.plan(
        &PlanTemplate::new("cancel")
            .then("cordon", "cordon-node", node("w1"))
            .then("label", "label-node", node("w1"))
            .then("verify", "verify-node-ready", node("w1")),
    );
    let plan_id = def.id;

    let orchestrator = Arc::clone(&h.orchestrator);
    let run = tokio::spawn(async move {
        orchestrator.execute(def, &CancellationToken::new()).await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.orchestrator.cancel(plan_id));

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status(), PlanStatus::RolledBack);
    assert_eq!(report.step_status(0), Some(StepStatus::Compensated));
    assert_eq!(report.step_status(1), Some(StepStatus::Compensated));
    assert_eq!(report.step_status(2), Some(StepStatus::Abandoned));
    assert!(report.snapshot.cancel_requested.is_some());
    assert_eq!(h.executor.count("verify-node-ready", CallKind::Action), 0);
    assert!(!h.orchestrator.cancel(plan_id));
}

#[tokio::test]
async fn file_journal_replays_to_the_same_report() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(FileJournal::open(dir.path()).await.unwrap());
    let executor = Arc::new(ScriptedExecutor::new());
    executor.then(
        "cordon-node",
        CallKind::Action,
        Outcome::retryable(FailureCategory::Network, "connection refused"),
    );
    let orchestrator =
        Orchestrator::new(registry(), Arc::clone(&executor) as _, Arc::clone(&journal) as _, config(3)).unwrap();
    let task = MaintenanceTask::new("file-journal", TaskKind::DrainNode);
    let def = PlanBuilder::new(orchestrator.registry())
        .build_from_template(
            &task,
            &PlanTemplate::new("drain")
                .then("cordon", "cordon-node", node("w1"))
                .then("verify", "verify-node-ready", node("w1")),
        )
        .unwrap();
    let plan_id = def.id;

    let report = orchestrator.execute(def, &CancellationToken::new()).await.unwrap();
    assert!(report.is_success());

    // A fresh process sees the same outcome.
    let reopened = Arc::new(FileJournal::open(dir.path()).await.unwrap());
    let restarted =
        Orchestrator::new(registry(), Arc::new(ScriptedExecutor::new()) as _, reopened as _, config(3)).unwrap();
    assert_eq!(restarted.journaled_plans().await.unwrap(), vec![plan_id]);
    let loaded = restarted.load_report(plan_id).await.unwrap();
    assert_eq!(loaded.status(), report.status());
    assert_eq!(
        loaded.snapshot.steps.iter().map(|s| (s.status, s.attempts)).collect::<Vec<_>>(),
        report.snapshot.steps.iter().map(|s| (s.status, s.attempts)).collect::<Vec<_>>()
    );

    let err = restarted.resume(plan_id, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AlreadyFinished { status: PlanStatus::Succeeded, .. }
    ));
    assert!(restarted.resume_all(&CancellationToken::new()).await.unwrap().is_empty());
    assert_eq!(restarted.board().health().plans, 1);
}

/// Flip one checksum digit of the first record containing `needle`.
fn corrupt_record(path: &std::path::Path, needle: &str) {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
    let line = lines.iter_mut().find(|l| l.contains(needle)).unwrap();
    let flipped = if line.starts_with('0') { "1" } else { "0" };
    line.replace_range(0..1, flipped);
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

#[rstest]
#[case::lost_attempt_needs_review("delete-lease", "\"event\":\"attempt\"", PlanStatus::NeedsOperatorReview, 0)]
#[case::idempotent_step_is_retried("cordon-node", "\"event\":\"attempt\"", PlanStatus::Succeeded, 1)]
#[case::surviving_success_settles("delete-lease", "\"to\":\"succeeded\"", PlanStatus::Succeeded, 0)]
#[tokio::test]
async fn corrupt_tail_makes_the_in_flight_step_ambiguous(
    #[case] operation: &str,
    #[case] needle: &str,
    #[case] expected: PlanStatus,
    #[case] reruns: usize,
) {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(FileJournal::open(dir.path()).await.unwrap());
    let first =
        Orchestrator::new(registry(), Arc::new(ScriptedExecutor::new()) as _, Arc::clone(&journal) as _, config(3)).unwrap();
    let def = PlanBuilder::new(first.registry())
        .build_from_template(
            &MaintenanceTask::new("corrupt", TaskKind::DrainNode),
            &PlanTemplate::new("one").then("step", operation, node("w1")),
        )
        .unwrap();
    let plan_id = def.id;
    assert!(first.execute(def, &CancellationToken::new()).await.unwrap().is_success());
    corrupt_record(&journal.path_for(plan_id), needle);

    let executor = Arc::new(ScriptedExecutor::new());
    let reopened = Arc::new(FileJournal::open(dir.path()).await.unwrap());
    let restarted =
        Orchestrator::new(registry(), Arc::clone(&executor) as _, reopened as _, config(3)).unwrap();
    let report = restarted.resume(plan_id, &CancellationToken::new()).await.unwrap();

    assert!(report.corruption.is_some());
    assert_eq!(report.status(), expected);
    assert_eq!(executor.count(operation, CallKind::Action), reruns);
    if expected == PlanStatus::NeedsOperatorReview {
        assert!(matches!(
            report.step("step").unwrap().flags.as_slice(),
            [StepFlag::NeedsReview { reason: ReviewReason::JournalCorruption, .. }]
        ));
    }
}

#[tokio::test]
async fn board_tracks_every_plan() {
    let h = Harness::new(config(3));
    let ok = h.plan(&PlanTemplate::new("cordon").then("cordon", "cordon-node", node("w1")));
    let ok_id = ok.id;
    h.orchestrator.execute(ok, &CancellationToken::new()).await.unwrap();

    let health = h.orchestrator.board().health();
    assert_eq!(health.status, HealthStatus::Ok);
    assert_eq!(health.plans, 1);
    assert_eq!(health.active, 0);

    let snapshot = h.orchestrator.board().snapshot(ok_id).unwrap();
    assert_eq!(snapshot.status, PlanStatus::Succeeded);
    assert_eq!(snapshot.count(StepStatus::Succeeded), 1);
    assert!(h.orchestrator.running().is_empty());
}

#[tokio::test]
async fn run_plans_the_builtin_template() {
    let h = Harness::new(config(3));
    let task = MaintenanceTask::new("op-7", TaskKind::EtcdSnapshot);
    let err = h.orchestrator.run(&task, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::Plan(_)));
}
