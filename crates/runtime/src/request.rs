//! What the orchestrator asks the executor to run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use steward_core::{StepId, TargetKind};
use steward_execution::IdempotencyKey;
use steward_plan::RenderedCommand;

/// Why a command is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// The step's action.
    Action,
    /// The compensating action during rollback.
    Compensation,
    /// A read-only precondition probe.
    Precondition,
    /// A read-only reconciliation probe.
    Reconciliation,
}

impl CallKind {
    /// Returns `true` for read-only probes.
    pub fn is_probe(self) -> bool {
        matches!(self, Self::Precondition | Self::Reconciliation)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Compensation => write!(f, "compensation"),
            Self::Precondition => write!(f, "precondition"),
            Self::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

/// One external call.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Step on whose behalf the call runs.
    pub step: StepId,
    /// Operation name.
    pub operation: String,
    /// System the command acts on.
    pub target: TargetKind,
    /// Why the command runs.
    pub call: CallKind,
    /// 1-based attempt number of the enclosing attempt.
    pub attempt: u32,
    /// Key of the enclosing attempt.
    pub idempotency_key: IdempotencyKey,
    /// The command.
    pub command: RenderedCommand,
    /// Hard deadline for the call.
    pub timeout: Duration,
}
