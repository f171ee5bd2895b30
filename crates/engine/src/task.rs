//! One attempt of one step, run on the worker pool.
//!
//! A task never touches plan state. It asks the plan driver to journal its
//! attempt records through a [`JournalHandle`] and waits for the write to
//! be durable before calling out, then reports a [`TaskOutcome`] that the
//! driver turns into status transitions.

use std::sync::Arc;
use std::time::Duration;

use steward_core::{StepId, TargetLock};
use steward_execution::{
    AttemptKind, AttemptOutcome, ExecutionRecord, FailureCategory, IdempotencyKey, JournalEntry,
    ReviewReason,
};
use steward_plan::{Operation, RenderedCommand, RenderedProbe};
use steward_runtime::{
    CallKind, CommandExecutor, ExecutionRequest, Failure, Outcome, ProbeVerdict, judge,
};
use tokio::sync::{OwnedSemaphorePermit, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::locks::TargetLocks;

/// A journal write requested by a task.
#[derive(Debug)]
pub(crate) struct JournalWrite {
    pub entry: JournalEntry,
    pub ack: oneshot::Sender<bool>,
}

/// Sending side of the driver's write queue.
#[derive(Debug, Clone)]
pub(crate) struct JournalHandle(mpsc::UnboundedSender<JournalWrite>);

impl JournalHandle {
    pub fn new(sender: mpsc::UnboundedSender<JournalWrite>) -> Self {
        Self(sender)
    }

    /// Journal `entry`; `false` if the driver could not make it durable.
    async fn write(&self, entry: JournalEntry) -> bool {
        let (ack, done) = oneshot::channel();
        if self.0.send(JournalWrite { entry, ack }).is_err() {
            return false;
        }
        done.await.unwrap_or(false)
    }
}

/// What a task reports back to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    /// The action took effect (or reconciliation found it applied).
    Succeeded,
    /// Worth another attempt, budget permitting.
    Retry { message: String },
    /// Will not succeed by retrying.
    Fatal { message: String },
    /// Effect unknown; an operator has to decide.
    Review { reason: ReviewReason, detail: String },
    /// Nothing was called.
    NotStarted { reason: String },
    /// The journal refused a write; the driver is shutting down.
    Aborted,
}

/// Whether the task runs an attempt or only resolves an earlier one.
#[derive(Debug, Clone)]
pub(crate) enum TaskMode {
    /// Preconditions, then the action (or compensation) itself.
    Attempt,
    /// Run the reconciliation check for an attempt whose outcome is unknown.
    Reconcile {
        reason: ReviewReason,
        detail: String,
    },
}

/// Everything one attempt needs, detached from the driver.
pub(crate) struct StepTask {
    pub step: StepId,
    pub kind: AttemptKind,
    pub mode: TaskMode,
    pub attempt: u32,
    pub reconcile_attempt: u32,
    pub operation: Arc<Operation>,
    pub command: RenderedCommand,
    pub preconditions: Vec<RenderedProbe>,
    pub reconcile: Option<RenderedProbe>,
    pub lock: Option<TargetLock>,
    pub timeout: Duration,
    pub executor: Arc<dyn CommandExecutor>,
    pub locks: Arc<TargetLocks>,
    pub journal: JournalHandle,
    pub cancel: CancellationToken,
}

impl StepTask {
    /// Run on the pool; the permit is released when the task ends.
    pub async fn run(self, permit: OwnedSemaphorePermit) -> (usize, AttemptKind, TaskOutcome) {
        let index = self.step.index;
        let kind = self.kind;
        let span = tracing::info_span!(
            "step",
            plan_id = %self.step.plan_id,
            step = index,
            operation = %self.operation.name(),
            kind = %kind,
            attempt = self.attempt,
        );
        let outcome = self.execute().instrument(span).await;
        drop(permit);
        (index, kind, outcome)
    }

    async fn execute(self) -> TaskOutcome {
        let _guard = match &self.lock {
            Some(lock) => tokio::select! {
                guard = self.locks.acquire(lock) => Some(guard),
                () = self.cancel.cancelled() => {
                    return TaskOutcome::NotStarted {
                        reason: "cancelled while waiting for the target lock".into(),
                    };
                }
            },
            None => None,
        };

        if let TaskMode::Reconcile { reason, detail } = &self.mode {
            return self.reconcile(*reason, detail).await;
        }
        if self.cancel.is_cancelled() {
            return TaskOutcome::NotStarted {
                reason: "cancelled before the call".into(),
            };
        }

        for probe in &self.preconditions {
            let outcome = self
                .call(CallKind::Precondition, &probe.command, self.kind, self.attempt)
                .await;
            match judge(&probe.expect, &outcome) {
                ProbeVerdict::Holds => {}
                ProbeVerdict::DoesNotHold { observed } => {
                    let message = format!("precondition `{}` not met ({observed})", probe.command);
                    return self
                        .refuse(&probe.command, FailureCategory::PreconditionUnmet, message, true)
                        .await;
                }
                ProbeVerdict::Unobservable(failure) => {
                    let retryable = matches!(outcome, Outcome::Retryable(_));
                    let message = format!("precondition `{}` could not run: {failure}", probe.command);
                    return self
                        .refuse(&probe.command, failure.category, message, retryable)
                        .await;
                }
            }
        }

        let open = ExecutionRecord::open(self.step, self.operation.name(), self.kind, self.attempt)
            .with_command(self.command.to_string());
        if !self.journal.write(JournalEntry::attempt(open.clone())).await {
            return TaskOutcome::Aborted;
        }
        let call = if self.kind == AttemptKind::Compensation {
            CallKind::Compensation
        } else {
            CallKind::Action
        };
        let outcome = self.call(call, &self.command, self.kind, self.attempt).await;
        self.settle(&open, outcome).await
    }

    /// Journal an attempt that stopped at a precondition.
    async fn refuse(
        &self,
        probe: &RenderedCommand,
        category: FailureCategory,
        message: String,
        retryable: bool,
    ) -> TaskOutcome {
        tracing::info!(%message, retryable, "precondition refused the attempt");
        let record = ExecutionRecord::open(self.step, self.operation.name(), self.kind, self.attempt)
            .with_command(probe.to_string())
            .close(AttemptOutcome::Failed {
                retryable,
                category,
                message: message.clone(),
                output: None,
            });
        if !self.journal.write(JournalEntry::attempt(record)).await {
            return TaskOutcome::Aborted;
        }
        if retryable {
            TaskOutcome::Retry { message }
        } else {
            TaskOutcome::Fatal { message }
        }
    }

    /// Close `open` with the call's outcome.
    async fn settle(&self, open: &ExecutionRecord, outcome: Outcome) -> TaskOutcome {
        let (closed, next) = match outcome {
            Outcome::Success(output) => (
                AttemptOutcome::Succeeded { output },
                TaskOutcome::Succeeded,
            ),
            Outcome::Retryable(failure)
                if failure.is_timeout() && !self.operation.retry_is_safe() =>
            {
                tracing::warn!(%failure, "non-idempotent call timed out, outcome unknown");
                let closed = AttemptOutcome::Ambiguous {
                    category: failure.category,
                    message: failure.message.clone(),
                };
                if !self.journal.write(JournalEntry::attempt(open.close(closed))).await {
                    return TaskOutcome::Aborted;
                }
                return self
                    .reconcile(ReviewReason::AmbiguousOutcome, &failure.to_string())
                    .await;
            }
            Outcome::Retryable(failure) => {
                let message = failure.to_string();
                (failed(failure, true), TaskOutcome::Retry { message })
            }
            Outcome::Fatal(failure) => {
                let message = failure.to_string();
                (failed(failure, false), TaskOutcome::Fatal { message })
            }
        };
        tracing::debug!(outcome = closed.label(), "attempt finished");
        if self.journal.write(JournalEntry::attempt(open.close(closed))).await {
            next
        } else {
            TaskOutcome::Aborted
        }
    }

    /// Ask the target whether an attempt with unknown outcome took effect.
    async fn reconcile(&self, reason: ReviewReason, detail: &str) -> TaskOutcome {
        let Some(probe) = &self.reconcile else {
            return TaskOutcome::Review {
                reason,
                detail: format!("{detail}; no reconciliation check declared"),
            };
        };
        let record = ExecutionRecord::open(
            self.step,
            self.operation.name(),
            AttemptKind::Reconciliation,
            self.reconcile_attempt,
        )
        .with_command(probe.command.to_string());
        let outcome = self
            .call(
                CallKind::Reconciliation,
                &probe.command,
                AttemptKind::Reconciliation,
                self.reconcile_attempt,
            )
            .await;

        let (closed, next) = match judge(&probe.expect, &outcome) {
            ProbeVerdict::Holds => (AttemptOutcome::Applied, TaskOutcome::Succeeded),
            ProbeVerdict::DoesNotHold { observed } => (
                AttemptOutcome::NotApplied,
                TaskOutcome::Retry {
                    message: format!("{detail}; reconciliation found it not applied ({observed})"),
                },
            ),
            ProbeVerdict::Unobservable(failure) => {
                let detail = format!("{detail}; reconciliation check failed: {failure}");
                (
                    failed(failure, false),
                    TaskOutcome::Review {
                        reason: ReviewReason::ReconciliationFailed,
                        detail,
                    },
                )
            }
        };
        tracing::info!(verdict = closed.label(), "reconciliation finished");
        if self.journal.write(JournalEntry::attempt(record.close(closed))).await {
            next
        } else {
            TaskOutcome::Aborted
        }
    }

    async fn call(
        &self,
        call: CallKind,
        command: &RenderedCommand,
        kind: AttemptKind,
        attempt: u32,
    ) -> Outcome {
        let request = ExecutionRequest {
            step: self.step,
            operation: self.operation.name().to_owned(),
            target: self.operation.kind(),
            call,
            attempt,
            idempotency_key: IdempotencyKey::generate(self.step, kind, attempt),
            command: command.clone(),
            timeout: self.timeout,
        };
        self.executor.execute(&request).await
    }
}

fn failed(failure: Failure, retryable: bool) -> AttemptOutcome {
    AttemptOutcome::Failed {
        retryable,
        category: failure.category,
        message: failure.message,
        output: failure.output,
    }
}
