//! The single task that owns one plan's state while it runs.
//!
//! Every journal entry of the plan goes through [`PlanDriver::record`]:
//! applied to the in-memory [`PlanState`], appended to the journal, and
//! followed by a `PlanTransitioned` entry whenever the derived plan status
//! moves. Step tasks only send entries; they never write themselves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use steward_execution::{
    AttemptKind, AttemptOutcome, ExecutionRecord, FailureCategory, JournalEntry, PlanState,
    ReviewReason, StepFlag, StepStatus,
};
use steward_journal::JournalCorruption;
use steward_plan::{Operation, PlanDefinition, PlanError};
use steward_resilience::RetryDecision;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::board::PlanSnapshot;
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use crate::scheduler;
use crate::task::{JournalHandle, JournalWrite, StepTask, TaskMode, TaskOutcome};

type TaskResult = (usize, AttemptKind, TaskOutcome);

pub(crate) struct PlanDriver<'a> {
    orch: &'a Orchestrator,
    definition: Arc<PlanDefinition>,
    state: PlanState,
    cancel: CancellationToken,
    tasks: JoinSet<TaskResult>,
    in_flight: HashSet<usize>,
    not_before: HashMap<usize, Instant>,
    /// Steps with an unknown outcome waiting for a reconciliation task.
    reconcile_queue: Vec<(usize, AttemptKind, ReviewReason, String)>,
    /// Set when the journal was loaded with a truncated tail.
    corrupt_tail: Option<String>,
    rollback_order: Vec<usize>,
    writes_tx: mpsc::UnboundedSender<JournalWrite>,
    writes_rx: mpsc::UnboundedReceiver<JournalWrite>,
    spare: Option<OwnedSemaphorePermit>,
    wants_permit: bool,
    fatal: Option<EngineError>,
}

impl<'a> PlanDriver<'a> {
    pub fn new(
        orch: &'a Orchestrator,
        definition: PlanDefinition,
        state: PlanState,
        corruption: Option<&JournalCorruption>,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        scheduler::check_order(&definition)?;
        let rollback_order = scheduler::compensation_order(&definition)?;
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        Ok(Self {
            orch,
            definition: Arc::new(definition),
            state,
            cancel,
            tasks: JoinSet::new(),
            in_flight: HashSet::new(),
            not_before: HashMap::new(),
            reconcile_queue: Vec::new(),
            corrupt_tail: corruption.map(ToString::to_string),
            rollback_order,
            writes_tx,
            writes_rx,
            spare: None,
            wants_permit: false,
            fatal: None,
        })
    }

    /// Drive the plan until nothing more can happen, then hand back its state.
    pub async fn drive(mut self) -> Result<(Arc<PlanDefinition>, PlanState), EngineError> {
        match self.run().await {
            Ok(()) => {
                tracing::info!(status = %self.state.status(), "plan finished");
                Ok((self.definition, self.state))
            }
            Err(err) => {
                tracing::error!(error = %err, "plan driver stopped");
                self.cancel.cancel();
                self.drain().await;
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<(), EngineError> {
        self.publish();
        self.sync_plan_status().await?;
        self.recover().await?;

        loop {
            if let Some(err) = self.fatal.take() {
                return Err(err);
            }
            if self.cancel.is_cancelled() && self.state.cancel_requested.is_none() {
                tracing::warn!("cancellation requested");
                self.record(JournalEntry::CancellationRequested {
                    timestamp: Utc::now(),
                    reason: "cancelled by operator".into(),
                })
                .await?;
            }

            self.wants_permit = false;
            self.start_reconciliations();
            if self.halting() {
                self.abandon_pending().await?;
                if self.rolling_back() {
                    self.advance_rollback().await?;
                }
            } else {
                self.start_eligible().await?;
            }
            // A permit nobody took goes back to the pool.
            self.spare = None;

            let now = Instant::now();
            let wakeup = scheduler::next_wakeup(&self.state, &self.not_before, now);
            if self.tasks.is_empty() && wakeup.is_none() && !self.wants_permit {
                break;
            }

            let cancel_pending = self.state.cancel_requested.is_none();
            let has_tasks = !self.tasks.is_empty();
            let workers = Arc::clone(&self.orch.workers);
            tokio::select! {
                biased;
                Some(write) = self.writes_rx.recv() => self.handle_write(write).await,
                Some(joined) = self.tasks.join_next(), if has_tasks => self.handle_joined(joined).await?,
                () = self.cancel.cancelled(), if cancel_pending => {}
                permit = workers.acquire_owned(), if self.wants_permit => {
                    self.spare = permit.ok();
                    self.wants_permit = false;
                }
                () = tokio::time::sleep_until(wakeup.unwrap_or(now)), if wakeup.is_some() => {}
            }
        }
        Ok(())
    }

    // ── journal ────────────────────────────────────────────────────────────

    /// Apply, persist and publish one entry.
    async fn record(&mut self, entry: JournalEntry) -> Result<(), EngineError> {
        self.state.apply(&entry)?;
        self.orch.journal.append(self.definition.id, &entry).await?;
        self.sync_plan_status().await?;
        self.publish();
        Ok(())
    }

    /// Journal a `PlanTransitioned` entry if the derived status moved.
    async fn sync_plan_status(&mut self) -> Result<(), EngineError> {
        let from = self.state.recorded_status;
        let to = self.state.status();
        if from != to {
            let entry = JournalEntry::PlanTransitioned {
                timestamp: Utc::now(),
                from,
                to,
            };
            self.state.apply(&entry)?;
            self.orch.journal.append(self.definition.id, &entry).await?;
            tracing::info!(%from, %to, "plan status changed");
        }
        debug_assert_eq!(self.state.recorded_status, self.state.status());
        Ok(())
    }

    async fn transition(
        &mut self,
        index: usize,
        to: StepStatus,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        let from = self.state.step(index)?.status;
        tracing::info!(step = index, %from, %to, reason = reason.as_deref().unwrap_or(""), "step transition");
        self.record(JournalEntry::step_transitioned(index, from, to, reason))
            .await
    }

    async fn flag(&mut self, index: usize, flag: StepFlag) -> Result<(), EngineError> {
        tracing::warn!(step = index, ?flag, "step flagged for operator");
        self.record(JournalEntry::step_flagged(index, flag)).await
    }

    async fn handle_write(&mut self, write: JournalWrite) {
        let ok = match self.record(write.entry).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "journal write failed, stopping plan");
                self.fatal.get_or_insert(err);
                false
            }
        };
        let _ = write.ack.send(ok);
    }

    /// Refuse further writes and wait for every task to stop.
    async fn drain(&mut self) {
        loop {
            tokio::select! {
                Some(write) = self.writes_rx.recv() => {
                    let _ = write.ack.send(false);
                }
                joined = self.tasks.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
            }
        }
    }

    fn publish(&self) {
        self.orch
            .board
            .publish(PlanSnapshot::capture(&self.definition, &self.state));
    }

    // ── phases ─────────────────────────────────────────────────────────────

    /// Failure, cancellation or an operator flag stops new actions.
    fn halting(&self) -> bool {
        self.state.cancel_requested.is_some()
            || self.state.steps.iter().any(|s| s.status.is_failure() || s.needs_review())
    }

    /// Compensation runs once actions have stopped, unless an operator has
    /// to look at the plan first.
    fn rolling_back(&self) -> bool {
        self.tasks.is_empty()
            && self.reconcile_queue.is_empty()
            && !self.state.steps.iter().any(|s| s.needs_review())
            && self.state.steps.iter().any(|s| s.status.is_failure())
    }

    async fn abandon_pending(&mut self) -> Result<(), EngineError> {
        for index in self.state.steps_in(StepStatus::Pending) {
            if self.in_flight.contains(&index) {
                continue;
            }
            self.not_before.remove(&index);
            self.transition(index, StepStatus::Abandoned, Some("plan halted".into()))
                .await?;
        }
        Ok(())
    }

    async fn start_eligible(&mut self) -> Result<(), EngineError> {
        let ready = scheduler::eligible(
            &self.definition,
            &self.state,
            &self.in_flight,
            &self.not_before,
            Instant::now(),
        );
        for index in ready {
            let Some(permit) = self.permit() else {
                break;
            };
            self.not_before.remove(&index);
            self.transition(index, StepStatus::Running, None).await?;
            match self.prepare(index, AttemptKind::Action, TaskMode::Attempt) {
                Ok(task) => self.spawn(task, permit),
                Err(err) => self.refuse_unrunnable(index, &err).await?,
            }
        }
        Ok(())
    }

    fn start_reconciliations(&mut self) {
        while let Some((index, kind, reason, detail)) = self.reconcile_queue.pop() {
            let Some(permit) = self.permit() else {
                self.reconcile_queue.push((index, kind, reason, detail));
                return;
            };
            let mode = TaskMode::Reconcile { reason, detail };
            match self.prepare(index, kind, mode) {
                Ok(task) => self.spawn(task, permit),
                Err(err) => {
                    self.fatal.get_or_insert(err.into());
                    return;
                }
            }
        }
    }

    /// Compensate succeeded steps one at a time, in reverse topological
    /// order.
    async fn advance_rollback(&mut self) -> Result<(), EngineError> {
        if !self.tasks.is_empty() {
            return Ok(());
        }
        for index in self.rollback_order.clone() {
            let step = self.state.step(index)?;
            match step.status {
                StepStatus::Succeeded if !step.is_uncompensated() => {
                    let operation = Arc::clone(
                        self.orch
                            .registry
                            .lookup(&self.definition.steps[index].operation)?,
                    );
                    if operation.compensation().is_none() {
                        self.flag(
                            index,
                            StepFlag::Uncompensated {
                                detail: format!("`{}` declares no compensation", operation.name()),
                            },
                        )
                        .await?;
                        continue;
                    }
                    self.transition(index, StepStatus::Compensating, Some("rolling back".into()))
                        .await?;
                    return self.start_compensation(index).await;
                }
                StepStatus::Compensating if !step.needs_review() => {
                    return self.start_compensation(index).await;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn start_compensation(&mut self, index: usize) -> Result<(), EngineError> {
        if self
            .not_before
            .get(&index)
            .is_some_and(|deadline| *deadline > Instant::now())
        {
            return Ok(());
        }
        let Some(permit) = self.permit() else {
            return Ok(());
        };
        self.not_before.remove(&index);
        match self.prepare(index, AttemptKind::Compensation, TaskMode::Attempt) {
            Ok(mut task) => {
                let attempts = self.state.step(index)?.attempts(AttemptKind::Compensation);
                let budget = self.orch.config.attempt_budget(&task.operation);
                if attempts >= budget {
                    let last = self.state.step(index)?.last_error().unwrap_or("unknown error");
                    let detail = format!(
                        "compensation `{}` gave up after {attempts} attempts: {last}",
                        task.operation.name()
                    );
                    return self.give_up_compensation(index, detail).await;
                }
                // Rollback proceeds even when the plan was cancelled.
                task.cancel = CancellationToken::new();
                self.spawn(task, permit);
                Ok(())
            }
            Err(err) => self.give_up_compensation(index, err.to_string()).await,
        }
    }

    async fn give_up_compensation(&mut self, index: usize, detail: String) -> Result<(), EngineError> {
        self.transition(index, StepStatus::Succeeded, Some(detail.clone()))
            .await?;
        self.flag(index, StepFlag::Uncompensated { detail }).await
    }

    // ── tasks ──────────────────────────────────────────────────────────────

    fn permit(&mut self) -> Option<OwnedSemaphorePermit> {
        let permit = self
            .spare
            .take()
            .or_else(|| Arc::clone(&self.orch.workers).try_acquire_owned().ok());
        self.wants_permit = permit.is_none();
        permit
    }

    fn prepare(&self, index: usize, kind: AttemptKind, mode: TaskMode) -> Result<StepTask, PlanError> {
        let step = &self.definition.steps[index];
        let action = self.orch.registry.lookup(&step.operation)?;
        let operation = if kind == AttemptKind::Compensation {
            let name = action
                .compensation()
                .ok_or_else(|| PlanError::UnknownOperation(format!("compensation of {}", action.name())))?;
            Arc::clone(self.orch.registry.lookup(name)?)
        } else {
            Arc::clone(action)
        };

        let command = operation.command().render(&step.params)?;
        let preconditions = operation
            .preconditions()
            .iter()
            .map(|probe| probe.render(&step.params))
            .collect::<Result<Vec<_>, _>>()?;
        let reconcile = operation
            .reconcile()
            .map(|probe| probe.render(&step.params))
            .transpose()?;

        let state = &self.state.steps[index];
        Ok(StepTask {
            step: self.definition.step_id(index),
            kind,
            mode,
            attempt: state.attempts(kind) + 1,
            reconcile_attempt: state.attempts(AttemptKind::Reconciliation) + 1,
            timeout: self
                .orch
                .config
                .timeouts
                .resolve(operation.kind(), operation.timeout_override()),
            operation,
            command,
            preconditions,
            reconcile,
            lock: step.lock.clone(),
            executor: Arc::clone(&self.orch.executor),
            locks: Arc::clone(&self.orch.locks),
            journal: JournalHandle::new(self.writes_tx.clone()),
            cancel: self.cancel.clone(),
        })
    }

    fn spawn(&mut self, task: StepTask, permit: OwnedSemaphorePermit) {
        self.in_flight.insert(task.step.index);
        self.tasks.spawn(task.run(permit));
    }

    /// A step whose command cannot be rendered fails without a call.
    async fn refuse_unrunnable(&mut self, index: usize, err: &PlanError) -> Result<(), EngineError> {
        let step = &self.definition.steps[index];
        let attempt = self.state.step(index)?.attempts(AttemptKind::Action) + 1;
        let record = ExecutionRecord::open(
            self.definition.step_id(index),
            step.operation.clone(),
            AttemptKind::Action,
            attempt,
        )
        .close(AttemptOutcome::Failed {
            retryable: false,
            category: FailureCategory::InvalidInput,
            message: err.to_string(),
            output: None,
        });
        self.record(JournalEntry::attempt(record)).await?;
        self.transition(index, StepStatus::Failed, Some(err.to_string()))
            .await
    }

    async fn handle_joined(&mut self, joined: Result<TaskResult, JoinError>) -> Result<(), EngineError> {
        let (index, kind, outcome) = match joined {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(?join_err, "step task panicked");
                self.fatal
                    .get_or_insert(EngineError::TaskPanicked(join_err.to_string()));
                return Ok(());
            }
        };
        self.in_flight.remove(&index);
        if self.fatal.is_some() {
            return Ok(());
        }
        if kind == AttemptKind::Compensation {
            self.settle_compensation(index, outcome).await
        } else {
            self.settle_action(index, outcome).await
        }
    }

    async fn settle_action(&mut self, index: usize, outcome: TaskOutcome) -> Result<(), EngineError> {
        match outcome {
            TaskOutcome::Succeeded => self.transition(index, StepStatus::Succeeded, None).await,
            TaskOutcome::Retry { message } => self.retry_or_fail(index, message).await,
            TaskOutcome::Fatal { message } => {
                self.transition(index, StepStatus::Failed, Some(message))
                    .await
            }
            TaskOutcome::Review { reason, detail } => {
                self.flag(index, StepFlag::NeedsReview { reason, detail })
                    .await
            }
            TaskOutcome::NotStarted { reason } => {
                self.transition(index, StepStatus::Pending, Some(reason))
                    .await
            }
            TaskOutcome::Aborted => Ok(()),
        }
    }

    async fn retry_or_fail(&mut self, index: usize, message: String) -> Result<(), EngineError> {
        let operation = Arc::clone(
            self.orch
                .registry
                .lookup(&self.definition.steps[index].operation)?,
        );
        let attempts = self.state.step(index)?.attempts(AttemptKind::Action);
        let budget = self.orch.config.attempt_budget(&operation);
        match self.orch.config.retry.decide(attempts, budget) {
            RetryDecision::RetryAfter(delay) => {
                self.not_before.insert(index, Instant::now() + delay);
                let reason = format!("attempt {attempts}/{budget} failed: {message}; retrying in {delay:?}");
                self.transition(index, StepStatus::Pending, Some(reason))
                    .await
            }
            RetryDecision::Exhausted => {
                let reason = format!("gave up after {attempts} attempts: {message}");
                self.transition(index, StepStatus::Failed, Some(reason))
                    .await
            }
        }
    }

    async fn settle_compensation(
        &mut self,
        index: usize,
        outcome: TaskOutcome,
    ) -> Result<(), EngineError> {
        match outcome {
            TaskOutcome::Succeeded => self.transition(index, StepStatus::Compensated, None).await,
            TaskOutcome::Retry { message } => {
                let step = &self.definition.steps[index];
                let action = self.orch.registry.lookup(&step.operation)?;
                let Some(name) = action.compensation() else {
                    return self.give_up_compensation(index, message).await;
                };
                let compensation = Arc::clone(self.orch.registry.lookup(name)?);
                let attempts = self.state.step(index)?.attempts(AttemptKind::Compensation);
                let budget = self.orch.config.attempt_budget(&compensation);
                match self.orch.config.retry.decide(attempts, budget) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::info!(step = index, attempts, budget, ?delay, %message, "compensation will be retried");
                        self.not_before.insert(index, Instant::now() + delay);
                        Ok(())
                    }
                    RetryDecision::Exhausted => {
                        let detail = format!(
                            "compensation `{name}` gave up after {attempts} attempts: {message}"
                        );
                        self.give_up_compensation(index, detail).await
                    }
                }
            }
            TaskOutcome::Fatal { message } => {
                let detail = format!("compensation failed: {message}");
                self.give_up_compensation(index, detail).await
            }
            TaskOutcome::Review { reason, detail } => {
                self.flag(index, StepFlag::NeedsReview { reason, detail })
                    .await
            }
            TaskOutcome::NotStarted { .. } | TaskOutcome::Aborted => Ok(()),
        }
    }

    // ── resume ─────────────────────────────────────────────────────────────

    /// Settle steps a previous process left `Running` or `Compensating`.
    async fn recover(&mut self) -> Result<(), EngineError> {
        for index in 0..self.state.steps.len() {
            let step = self.state.step(index)?;
            if step.needs_review() {
                continue;
            }
            let status = step.status;
            match (status, self.corrupt_tail.clone()) {
                (StepStatus::Running | StepStatus::Compensating, Some(tail)) => {
                    self.recover_after_corruption(index, status, &tail).await?;
                }
                (StepStatus::Running, None) => self.recover_action(index).await?,
                (StepStatus::Compensating, None) => self.recover_compensation(index).await?,
                _ => {}
            }
        }
        Ok(())
    }

    /// A step was in flight when the journal lost its tail, so its latest
    /// attempt record may be gone. Only a surviving success settles it;
    /// anything else is treated like a call with unknown outcome.
    async fn recover_after_corruption(
        &mut self,
        index: usize,
        status: StepStatus,
        tail: &str,
    ) -> Result<(), EngineError> {
        let (kind, settled_as) = if status == StepStatus::Compensating {
            (AttemptKind::Compensation, StepStatus::Compensated)
        } else {
            (AttemptKind::Action, StepStatus::Succeeded)
        };
        let step = self.state.step(index)?;
        let settled = step
            .records
            .iter()
            .rev()
            .find(|r| match kind {
                AttemptKind::Compensation => r.kind != AttemptKind::Action,
                _ => r.kind != AttemptKind::Compensation,
            })
            .and_then(|r| r.outcome.as_ref())
            .is_some_and(|o| matches!(o, AttemptOutcome::Succeeded { .. } | AttemptOutcome::Applied));
        let open = step.open_record().cloned();
        if settled {
            return self.transition(index, settled_as, None).await;
        }

        let Some(operation) = self.operation_for(index, kind)? else {
            return self
                .give_up_compensation(index, format!("{tail}; no compensation declared"))
                .await;
        };
        if let Some(open) = open {
            self.record(JournalEntry::attempt(open.close(AttemptOutcome::Interrupted)))
                .await?;
        }
        let detail = format!("{tail}; records of `{}` may be lost", operation.name());
        tracing::warn!(step = index, %detail, "step was in flight when the journal tail was lost");
        self.resolve_unknown(
            index,
            kind,
            ReviewReason::JournalCorruption,
            &operation,
            detail,
        )
        .await
    }

    /// The operation an attempt of `kind` runs: the step's action, or its
    /// compensation (`None` if it declares none).
    fn operation_for(&self, index: usize, kind: AttemptKind) -> Result<Option<Arc<Operation>>, PlanError> {
        let action = self.orch.registry.lookup(&self.definition.steps[index].operation)?;
        if kind != AttemptKind::Compensation {
            return Ok(Some(Arc::clone(action)));
        }
        action
            .compensation()
            .map(|name| self.orch.registry.lookup(name).map(Arc::clone))
            .transpose()
    }

    async fn recover_action(&mut self, index: usize) -> Result<(), EngineError> {
        let operation = Arc::clone(
            self.orch
                .registry
                .lookup(&self.definition.steps[index].operation)?,
        );
        let step = self.state.step(index)?;

        if let Some(open) = step.open_record().cloned() {
            let detail = format!(
                "process stopped during attempt {} of `{}`",
                open.attempt,
                operation.name()
            );
            tracing::warn!(step = index, %detail, "found interrupted attempt");
            self.record(JournalEntry::attempt(open.close(AttemptOutcome::Interrupted)))
                .await?;
            return self
                .resolve_unknown(
                    index,
                    AttemptKind::Action,
                    ReviewReason::InterruptedAttempt,
                    &operation,
                    detail,
                )
                .await;
        }

        let last = step
            .records
            .iter()
            .rev()
            .find(|r| r.kind != AttemptKind::Compensation)
            .and_then(|r| r.outcome.clone().map(|o| (r.kind, o)));
        match last {
            None => {
                self.transition(
                    index,
                    StepStatus::Pending,
                    Some("restarted before the first attempt".into()),
                )
                .await
            }
            Some((_, AttemptOutcome::Succeeded { .. } | AttemptOutcome::Applied)) => {
                self.transition(index, StepStatus::Succeeded, None).await
            }
            Some((_, AttemptOutcome::NotApplied)) => {
                self.retry_or_fail(index, "reconciliation found it not applied".into())
                    .await
            }
            Some((AttemptKind::Reconciliation, AttemptOutcome::Failed { message, .. })) => {
                self.flag(
                    index,
                    StepFlag::NeedsReview {
                        reason: ReviewReason::ReconciliationFailed,
                        detail: message,
                    },
                )
                .await
            }
            Some((_, AttemptOutcome::Failed { retryable: true, message, .. })) => {
                self.retry_or_fail(index, message).await
            }
            Some((_, AttemptOutcome::Failed { message, .. })) => {
                self.transition(index, StepStatus::Failed, Some(message))
                    .await
            }
            Some((_, outcome @ (AttemptOutcome::Ambiguous { .. } | AttemptOutcome::Interrupted))) => {
                let detail = outcome.message().map_or_else(
                    || format!("outcome of `{}` unknown after restart", operation.name()),
                    str::to_owned,
                );
                self.resolve_unknown(
                    index,
                    AttemptKind::Action,
                    ReviewReason::InterruptedAttempt,
                    &operation,
                    detail,
                )
                .await
            }
        }
    }

    async fn recover_compensation(&mut self, index: usize) -> Result<(), EngineError> {
        let step = &self.definition.steps[index];
        let action = self.orch.registry.lookup(&step.operation)?;
        let Some(name) = action.compensation() else {
            return self
                .give_up_compensation(index, format!("`{}` declares no compensation", action.name()))
                .await;
        };
        let compensation = Arc::clone(self.orch.registry.lookup(name)?);
        let state = self.state.step(index)?;

        if let Some(open) = state.open_record().cloned() {
            let detail = format!(
                "process stopped during compensation attempt {} of `{name}`",
                open.attempt
            );
            tracing::warn!(step = index, %detail, "found interrupted compensation");
            self.record(JournalEntry::attempt(open.close(AttemptOutcome::Interrupted)))
                .await?;
            return self
                .resolve_unknown(
                    index,
                    AttemptKind::Compensation,
                    ReviewReason::InterruptedAttempt,
                    &compensation,
                    detail,
                )
                .await;
        }

        let last = state
            .records
            .iter()
            .rev()
            .find(|r| r.kind != AttemptKind::Action)
            .and_then(|r| r.outcome.clone());
        match last {
            Some(AttemptOutcome::Succeeded { .. } | AttemptOutcome::Applied) => {
                self.transition(index, StepStatus::Compensated, None).await
            }
            // Anything else: the rollback phase retries within budget.
            _ => Ok(()),
        }
    }

    /// An attempt whose effect is unknown: re-run it if that is safe,
    /// otherwise ask the reconciliation check, otherwise flag it.
    async fn resolve_unknown(
        &mut self,
        index: usize,
        kind: AttemptKind,
        reason: ReviewReason,
        operation: &Operation,
        detail: String,
    ) -> Result<(), EngineError> {
        if operation.retry_is_safe() {
            return match kind {
                AttemptKind::Compensation => Ok(()),
                _ => self.retry_or_fail(index, detail).await,
            };
        }
        if operation.reconcile().is_some() {
            self.reconcile_queue.push((index, kind, reason, detail));
            return Ok(());
        }
        self.flag(
            index,
            StepFlag::NeedsReview {
                reason,
                detail: format!("{detail}; no reconciliation check declared"),
            },
        )
        .await
    }
}
