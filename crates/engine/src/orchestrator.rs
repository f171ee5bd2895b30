//! The orchestrator: plans maintenance tasks and drives them to a terminal
//! status.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use steward_core::PlanId;
use steward_execution::PlanState;
use steward_journal::{Journal, JournalCorruption};
use steward_plan::{MaintenanceTask, OperationRegistry, PlanBuilder, PlanDefinition};
use steward_runtime::CommandExecutor;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::board::{PlanSnapshot, StatusBoard};
use crate::config::OrchestratorConfig;
use crate::driver::PlanDriver;
use crate::error::EngineError;
use crate::locks::TargetLocks;
use crate::report::PlanReport;
use crate::scheduler;

/// Runs maintenance plans against the cluster.
///
/// One orchestrator serves every plan of a process. Plans share the worker
/// pool, the target locks and the status board; each plan is driven by its
/// own call to [`run`](Self::run), [`execute`](Self::execute) or
/// [`resume`](Self::resume).
pub struct Orchestrator {
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) journal: Arc<dyn Journal>,
    pub(crate) locks: Arc<TargetLocks>,
    pub(crate) board: Arc<StatusBoard>,
    pub(crate) workers: Arc<Semaphore>,
    pub(crate) config: OrchestratorConfig,
    running: DashMap<PlanId, CancellationToken>,
}

impl Orchestrator {
    /// Create an orchestrator; fails if `config` does not validate.
    pub fn new(
        registry: Arc<OperationRegistry>,
        executor: Arc<dyn CommandExecutor>,
        journal: Arc<dyn Journal>,
        config: OrchestratorConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            registry,
            executor,
            journal,
            locks: Arc::new(TargetLocks::new()),
            board: Arc::new(StatusBoard::new()),
            workers: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            running: DashMap::new(),
        })
    }

    /// Share target locks with another orchestrator.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<TargetLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Publish into an existing status board.
    #[must_use]
    pub fn with_board(mut self, board: Arc<StatusBoard>) -> Self {
        self.board = board;
        self
    }

    /// Live plan snapshots.
    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Locks held by in-flight calls.
    pub fn locks(&self) -> &Arc<TargetLocks> {
        &self.locks
    }

    /// The operation catalog plans are built from.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// The effective configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Plans currently driven by this orchestrator.
    pub fn running(&self) -> Vec<PlanId> {
        let mut ids: Vec<_> = self.running.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Build the plan for `task` without running it.
    pub fn plan(&self, task: &MaintenanceTask) -> Result<PlanDefinition, EngineError> {
        Ok(PlanBuilder::new(&self.registry).build(task)?)
    }

    /// Plan `task`, journal it and drive it to a terminal status.
    pub async fn run(
        &self,
        task: &MaintenanceTask,
        cancel: &CancellationToken,
    ) -> Result<PlanReport, EngineError> {
        let definition = self.plan(task)?;
        tracing::info!(
            plan_id = %definition.id,
            request_id = %task.request_id,
            task = %task.kind,
            steps = definition.steps.len(),
            "plan built"
        );
        self.execute(definition, cancel).await
    }

    /// Journal an already built plan and drive it.
    pub async fn execute(
        &self,
        definition: PlanDefinition,
        cancel: &CancellationToken,
    ) -> Result<PlanReport, EngineError> {
        scheduler::check_order(&definition)?;
        let _running = self.register(definition.id, cancel)?;
        self.journal.create(&definition).await?;
        let state = PlanState::new(&definition);
        self.drive(definition, state, None, cancel).await
    }

    /// Continue a plan from its journal after a restart.
    pub async fn resume(
        &self,
        plan_id: PlanId,
        cancel: &CancellationToken,
    ) -> Result<PlanReport, EngineError> {
        let _running = self.register(plan_id, cancel)?;
        let loaded = self.journal.load_plan(plan_id).await?;
        let replayed = loaded.replay()?;
        let status = replayed.state.recorded_status;
        if status.is_terminal() && replayed.state.status() == status {
            self.board
                .publish(PlanSnapshot::capture(&replayed.definition, &replayed.state));
            return Err(EngineError::AlreadyFinished { plan_id, status });
        }
        tracing::info!(
            %plan_id,
            entries = replayed.entries,
            %status,
            truncated = loaded.is_truncated(),
            "resuming plan"
        );
        self.drive(replayed.definition, replayed.state, loaded.corruption, cancel)
            .await
    }

    /// Resume every unfinished plan in the journal, one after another.
    ///
    /// Finished plans are published to the board and skipped. A plan that
    /// fails to resume is logged and does not stop the others.
    pub async fn resume_all(&self, cancel: &CancellationToken) -> Result<Vec<PlanReport>, EngineError> {
        let mut reports = Vec::new();
        for plan_id in self.journal.list_plans().await? {
            if cancel.is_cancelled() {
                break;
            }
            match self.resume(plan_id, cancel).await {
                Ok(report) => reports.push(report),
                Err(EngineError::AlreadyFinished { .. }) => {}
                Err(err) => tracing::error!(%plan_id, error = %err, "could not resume plan"),
            }
        }
        Ok(reports)
    }

    /// Request cancellation of a running plan; `false` if it is not running
    /// here.
    pub fn cancel(&self, plan_id: PlanId) -> bool {
        self.running.get(&plan_id).is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Every plan in the journal.
    pub async fn journaled_plans(&self) -> Result<Vec<PlanId>, EngineError> {
        Ok(self.journal.list_plans().await?)
    }

    /// Reconstruct a plan's report from the journal without driving it.
    pub async fn load_report(&self, plan_id: PlanId) -> Result<PlanReport, EngineError> {
        let started = Instant::now();
        let loaded = self.journal.load_plan(plan_id).await?;
        let replayed = loaded.replay()?;
        Ok(PlanReport {
            snapshot: PlanSnapshot::capture(&replayed.definition, &replayed.state),
            duration: started.elapsed(),
            corruption: loaded.corruption,
        })
    }

    fn register(
        &self,
        plan_id: PlanId,
        cancel: &CancellationToken,
    ) -> Result<RunningGuard<'_>, EngineError> {
        match self.running.entry(plan_id) {
            Entry::Occupied(_) => Err(EngineError::AlreadyRunning(plan_id)),
            Entry::Vacant(slot) => {
                slot.insert(cancel.child_token());
                Ok(RunningGuard {
                    running: &self.running,
                    plan_id,
                })
            }
        }
    }

    async fn drive(
        &self,
        definition: PlanDefinition,
        state: PlanState,
        corruption: Option<JournalCorruption>,
        cancel: &CancellationToken,
    ) -> Result<PlanReport, EngineError> {
        let started = Instant::now();
        let plan_id = definition.id;
        let span = tracing::info_span!("plan", %plan_id, task = %definition.task.kind);
        let token = self
            .running
            .get(&plan_id)
            .map_or_else(|| cancel.child_token(), |t| t.clone());

        let driver = PlanDriver::new(self, definition, state, corruption.as_ref(), token)?;
        let (definition, state) = driver.drive().instrument(span).await?;
        Ok(PlanReport {
            snapshot: PlanSnapshot::capture(&definition, &state),
            duration: started.elapsed(),
            corruption,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("operations", &self.registry.len())
            .field("config", &self.config)
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}

/// Unregisters a plan when its driver returns.
struct RunningGuard<'a> {
    running: &'a DashMap<PlanId, CancellationToken>,
    plan_id: PlanId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.plan_id);
    }
}
