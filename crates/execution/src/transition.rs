//! State machine transition validation for steps and plans.

use crate::error::ExecutionError;
use crate::status::{PlanStatus, StepStatus};

/// Returns `true` if the step-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_step(from: StepStatus, to: StepStatus) -> bool {
    matches!(
        (from, to),
        (StepStatus::Pending, StepStatus::Running)
            | (StepStatus::Pending, StepStatus::Abandoned)
            | (StepStatus::Running, StepStatus::Succeeded)
            | (StepStatus::Running, StepStatus::Pending)
            | (StepStatus::Running, StepStatus::Failed)
            | (StepStatus::Succeeded, StepStatus::Compensating)
            | (StepStatus::Compensating, StepStatus::Compensated)
            | (StepStatus::Compensating, StepStatus::Succeeded)
    )
}

/// Validate a step-level transition, returning an error if invalid.
pub fn validate_step_transition(from: StepStatus, to: StepStatus) -> Result<(), ExecutionError> {
    if can_transition_step(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Returns `true` if the plan-level transition from `from` to `to` is valid.
///
/// Plan status only moves forward; a derived status may skip intermediate
/// states (a plan cancelled before its first step goes straight from
/// `Building` to `RolledBack`).
#[must_use]
pub fn can_transition_plan(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::{Building, Executing, Failed, NeedsOperatorReview, RolledBack, Succeeded};
    matches!(
        (from, to),
        (Building, Executing | Failed | RolledBack | NeedsOperatorReview)
            | (Executing, Succeeded | Failed | RolledBack | NeedsOperatorReview)
            | (Failed, RolledBack | NeedsOperatorReview)
    )
}

/// Validate a plan-level transition, returning an error if invalid.
pub fn validate_plan_transition(from: PlanStatus, to: PlanStatus) -> Result<(), ExecutionError> {
    if can_transition_plan(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
