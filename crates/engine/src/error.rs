//! Engine error types.

use steward_core::PlanId;
use steward_execution::PlanStatus;

/// Errors from the orchestrator.
///
/// Step failures are not errors: they become status transitions and show
/// up in the [`PlanReport`](crate::PlanReport). These variants mean the
/// orchestrator itself could not continue.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Building the plan failed.
    #[error("plan error: {0}")]
    Plan(#[from] steward_plan::PlanError),

    /// A journal entry did not fit the plan state.
    #[error("execution error: {0}")]
    Execution(#[from] steward_execution::ExecutionError),

    /// Writing or reading the journal failed.
    #[error("journal error: {0}")]
    Journal(#[from] steward_journal::JournalError),

    /// The orchestrator configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] steward_resilience::ConfigError),

    /// The plan is already being driven by this process.
    #[error("plan {0} is already running")]
    AlreadyRunning(PlanId),

    /// The plan reached a terminal status earlier; there is nothing to resume.
    #[error("plan {plan_id} already finished as {status}")]
    AlreadyFinished {
        /// The plan.
        plan_id: PlanId,
        /// Its terminal status.
        status: PlanStatus,
    },

    /// A step task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}
