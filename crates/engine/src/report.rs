//! The result of driving one plan.

use std::time::Duration;

use serde::Serialize;
use steward_core::PlanId;
use steward_execution::{PlanStatus, StepFlag, StepStatus};
use steward_journal::JournalCorruption;

use crate::board::{PlanSnapshot, StepSnapshot};

/// Final state of a plan after [`Orchestrator::run`](crate::Orchestrator::run)
/// or [`resume`](crate::Orchestrator::resume) returned.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    /// Steps and status at the end.
    #[serde(flatten)]
    pub snapshot: PlanSnapshot,
    /// Wall-clock time spent in this call.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Corrupt journal tail discarded before resuming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<JournalCorruption>,
}

impl PlanReport {
    /// Plan identity.
    pub fn plan_id(&self) -> PlanId {
        self.snapshot.plan_id
    }

    /// Final plan status.
    pub fn status(&self) -> PlanStatus {
        self.snapshot.status
    }

    /// Whether every step succeeded.
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Whether an operator has to look at the plan.
    pub fn needs_review(&self) -> bool {
        self.status() == PlanStatus::NeedsOperatorReview
    }

    /// Status of step `index`.
    pub fn step_status(&self, index: usize) -> Option<StepStatus> {
        self.snapshot.steps.get(index).map(|s| s.status)
    }

    /// Step by template key.
    pub fn step(&self, key: &str) -> Option<&StepSnapshot> {
        self.snapshot.steps.iter().find(|s| s.key == key)
    }

    /// Steps rollback could not undo.
    pub fn uncompensated(&self) -> Vec<&StepSnapshot> {
        self.flagged(|f| matches!(f, StepFlag::Uncompensated { .. }))
    }

    /// Steps whose effect on the target is unknown.
    pub fn ambiguous(&self) -> Vec<&StepSnapshot> {
        self.flagged(|f| matches!(f, StepFlag::NeedsReview { .. }))
    }

    fn flagged(&self, pred: impl Fn(&StepFlag) -> bool) -> Vec<&StepSnapshot> {
        self.snapshot
            .steps
            .iter()
            .filter(|s| s.flags.iter().any(&pred))
            .collect()
    }
}
