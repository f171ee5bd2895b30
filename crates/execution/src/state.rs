//! Plan and step state, rebuilt by applying journal entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_core::PlanId;
use steward_plan::PlanDefinition;

use crate::error::ExecutionError;
use crate::idempotency::IdempotencyLedger;
use crate::journal::JournalEntry;
use crate::record::{AttemptKind, AttemptOutcome, ExecutionRecord};
use crate::status::{PlanStatus, StepStatus};
use crate::transition::{validate_plan_transition, validate_step_transition};

/// Why a step needs an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// A non-idempotent call timed out and nothing can tell whether it
    /// took effect.
    AmbiguousOutcome,
    /// The process stopped while a call was in flight.
    InterruptedAttempt,
    /// The reconciliation check itself could not run.
    ReconciliationFailed,
    /// The journal lost its tail while the step was in flight.
    JournalCorruption,
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousOutcome => write!(f, "ambiguous_outcome"),
            Self::InterruptedAttempt => write!(f, "interrupted_attempt"),
            Self::ReconciliationFailed => write!(f, "reconciliation_failed"),
            Self::JournalCorruption => write!(f, "journal_corruption"),
        }
    }
}

/// Operator-facing marks on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum StepFlag {
    /// The step succeeded and rollback could not undo it.
    Uncompensated {
        /// Why (no declared compensation, or the compensation failed).
        detail: String,
    },
    /// The step's effect on the target is unknown.
    NeedsReview {
        /// Cause.
        reason: ReviewReason,
        /// Detail for the operator.
        detail: String,
    },
}

/// State of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Current status.
    pub status: StepStatus,
    /// Number of times the step entered `Running`.
    pub runs: u32,
    /// Every attempt record, open ones included, in journal order.
    #[serde(default)]
    pub records: Vec<ExecutionRecord>,
    /// Operator flags.
    #[serde(default)]
    pub flags: Vec<StepFlag>,
    /// Reason given with the latest transition.
    #[serde(default)]
    pub last_reason: Option<String>,
    /// When the step last changed status.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StepState {
    /// A step that has not been touched.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StepStatus::Pending,
            runs: 0,
            records: Vec::new(),
            flags: Vec::new(),
            last_reason: None,
            updated_at: None,
        }
    }

    /// Number of attempts of `kind` journaled so far.
    #[must_use]
    pub fn attempts(&self, kind: AttemptKind) -> u32 {
        let count = self.records.iter().filter(|r| r.kind == kind).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The attempt still open, if the process stopped mid-call.
    #[must_use]
    pub fn open_record(&self) -> Option<&ExecutionRecord> {
        self.records.iter().rev().find(|r| r.is_open())
    }

    /// Latest closed record of `kind`.
    #[must_use]
    pub fn last_closed(&self, kind: AttemptKind) -> Option<&ExecutionRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.kind == kind && !r.is_open())
    }

    /// Returns `true` if the step carries a needs-review flag.
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, StepFlag::NeedsReview { .. }))
    }

    /// Returns `true` if the step carries an uncompensated flag.
    #[must_use]
    pub fn is_uncompensated(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, StepFlag::Uncompensated { .. }))
    }

    /// Latest failure message, for reports.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .filter_map(|r| r.outcome.as_ref())
            .find_map(AttemptOutcome::message)
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a plan's status from its steps.
///
/// 1. Any step flagged needs-review: `NeedsOperatorReview`.
/// 2. Every step succeeded: `Succeeded`.
/// 3. No step failed or abandoned: `Building` while nothing ever ran,
///    otherwise `Executing`.
/// 4. Otherwise the plan is rolling back: `Failed` while any step is
///    pending, running or compensating, or a succeeded step is neither
///    compensated nor flagged uncompensated.
/// 5. Rollback finished: `NeedsOperatorReview` if anything is
///    uncompensated, else `RolledBack`.
#[must_use]
pub fn derive_plan_status(steps: &[StepState]) -> PlanStatus {
    if steps.iter().any(StepState::needs_review) {
        return PlanStatus::NeedsOperatorReview;
    }
    if !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Succeeded) {
        return PlanStatus::Succeeded;
    }
    if !steps.iter().any(|s| s.status.is_failure()) {
        let untouched = steps
            .iter()
            .all(|s| s.status == StepStatus::Pending && s.runs == 0);
        return if untouched {
            PlanStatus::Building
        } else {
            PlanStatus::Executing
        };
    }
    let rolling_back = steps.iter().any(|s| match s.status {
        StepStatus::Pending | StepStatus::Running | StepStatus::Compensating => true,
        StepStatus::Succeeded => !s.is_uncompensated(),
        StepStatus::Failed | StepStatus::Compensated | StepStatus::Abandoned => false,
    });
    if rolling_back {
        PlanStatus::Failed
    } else if steps.iter().any(StepState::is_uncompensated) {
        PlanStatus::NeedsOperatorReview
    } else {
        PlanStatus::RolledBack
    }
}

/// The complete state of one plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanState {
    /// Plan identity.
    pub plan_id: PlanId,
    /// Per-step state, indexed like the definition's steps.
    pub steps: Vec<StepState>,
    /// Latest plan status written to the journal.
    pub recorded_status: PlanStatus,
    /// Cancellation reason, once requested.
    #[serde(default)]
    pub cancel_requested: Option<String>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the last entry was applied.
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    ledger: IdempotencyLedger,
}

impl PlanState {
    /// Fresh state for a newly built plan.
    #[must_use]
    pub fn new(definition: &PlanDefinition) -> Self {
        Self {
            plan_id: definition.id,
            steps: vec![StepState::new(); definition.len()],
            recorded_status: PlanStatus::Building,
            cancel_requested: None,
            created_at: definition.created_at,
            updated_at: definition.created_at,
            ledger: IdempotencyLedger::new(),
        }
    }

    /// The status derived from the current step states.
    #[must_use]
    pub fn status(&self) -> PlanStatus {
        derive_plan_status(&self.steps)
    }

    /// Step by index.
    pub fn step(&self, index: usize) -> Result<&StepState, ExecutionError> {
        self.steps.get(index).ok_or(ExecutionError::StepNotFound(index))
    }

    fn step_mut(&mut self, index: usize) -> Result<&mut StepState, ExecutionError> {
        self.steps
            .get_mut(index)
            .ok_or(ExecutionError::StepNotFound(index))
    }

    /// The idempotency ledger built from the applied records.
    #[must_use]
    pub fn ledger(&self) -> &IdempotencyLedger {
        &self.ledger
    }

    /// Indices of steps in `status`.
    #[must_use]
    pub fn steps_in(&self, status: StepStatus) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == status)
            .map(|(i, _)| i)
            .collect()
    }

    /// Apply one journal entry, validating it against the current state.
    pub fn apply(&mut self, entry: &JournalEntry) -> Result<(), ExecutionError> {
        let timestamp = entry.timestamp();
        match entry {
            JournalEntry::PlanCreated { .. } => return Err(ExecutionError::DuplicateDefinition),
            JournalEntry::Attempt { record, .. } => self.apply_record(record)?,
            JournalEntry::StepTransitioned {
                step,
                from,
                to,
                reason,
                ..
            } => {
                let state = self.step_mut(*step)?;
                if state.status != *from {
                    return Err(ExecutionError::StatusMismatch {
                        step: *step,
                        expected: from.to_string(),
                        actual: state.status.to_string(),
                    });
                }
                validate_step_transition(*from, *to)?;
                state.status = *to;
                state.last_reason.clone_from(reason);
                state.updated_at = Some(timestamp);
                if *to == StepStatus::Running {
                    state.runs += 1;
                }
                if *to == StepStatus::Compensated {
                    self.ledger.clear_success(*step);
                }
            }
            JournalEntry::StepFlagged { step, flag, .. } => {
                let state = self.step_mut(*step)?;
                if !state.flags.contains(flag) {
                    state.flags.push(flag.clone());
                }
                state.updated_at = Some(timestamp);
            }
            JournalEntry::PlanTransitioned { from, to, .. } => {
                if self.recorded_status != *from {
                    return Err(ExecutionError::InvalidTransition {
                        from: self.recorded_status.to_string(),
                        to: to.to_string(),
                    });
                }
                validate_plan_transition(*from, *to)?;
                self.recorded_status = *to;
            }
            JournalEntry::CancellationRequested { reason, .. } => {
                if self.cancel_requested.is_none() {
                    self.cancel_requested = Some(reason.clone());
                }
            }
        }
        self.updated_at = timestamp;
        Ok(())
    }

    fn apply_record(&mut self, record: &ExecutionRecord) -> Result<(), ExecutionError> {
        if record.step.plan_id != self.plan_id {
            return Err(ExecutionError::PlanMismatch {
                expected: self.plan_id.to_string(),
                found: record.step.plan_id.to_string(),
            });
        }
        let index = record.step.index;
        let succeeded_action =
            record.kind == AttemptKind::Action && record.outcome.as_ref().is_some_and(AttemptOutcome::is_success);
        let state = self.step_mut(index)?;

        if record.is_open() {
            if state.open_record().is_some() {
                return Err(ExecutionError::OverlappingAttempt {
                    step: index,
                    attempt: record.attempt,
                });
            }
            state.records.push(record.clone());
        } else if let Some(open) = state
            .records
            .iter_mut()
            .rev()
            .find(|r| r.is_open() && r.idempotency_key == record.idempotency_key)
        {
            *open = record.clone();
        } else {
            state.records.push(record.clone());
        }

        self.ledger.check_and_mark(&record.idempotency_key);
        if succeeded_action {
            self.ledger.record_success(index, &record.idempotency_key)?;
        }
        Ok(())
    }
}
