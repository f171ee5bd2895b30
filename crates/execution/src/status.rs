//! Step and plan status enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a single step is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for dependencies, locks or a retry backoff.
    Pending,
    /// An action attempt is in flight (or was, when the process died).
    Running,
    /// The action took effect.
    Succeeded,
    /// The action failed for good.
    Failed,
    /// The compensating action is in flight.
    Compensating,
    /// The compensating action took effect.
    Compensated,
    /// Never started because the plan failed or was cancelled.
    Abandoned,
}

impl StepStatus {
    /// Returns `true` if no further transition will happen on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Compensated | Self::Abandoned)
    }

    /// Returns `true` if an external call may be in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Compensating)
    }

    /// Returns `true` for the statuses that make a plan fail.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Abandoned)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Compensating => write!(f, "compensating"),
            Self::Compensated => write!(f, "compensated"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Overall status of a plan, derived from its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Built and persisted, nothing attempted yet.
    Building,
    /// Steps are being attempted.
    Executing,
    /// Every step succeeded.
    Succeeded,
    /// A step failed or the plan was cancelled; rollback is in progress.
    Failed,
    /// Rollback finished and every succeeded step was compensated.
    RolledBack,
    /// A step's effect is unknown or could not be undone.
    NeedsOperatorReview,
}

impl PlanStatus {
    /// Returns `true` if the orchestrator has nothing left to do.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::RolledBack | Self::NeedsOperatorReview
        )
    }

    /// Returns `true` if the plan is still being driven.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns `true` if the plan completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Executing => write!(f, "executing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::NeedsOperatorReview => write!(f, "needs_operator_review"),
        }
    }
}
