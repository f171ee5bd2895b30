//! Execution error types.

use thiserror::Error;

/// Errors raised while applying journal entries to plan state.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A state transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// An entry claims a step was in a status it was not in.
    #[error("step {step}: entry expects status {expected}, found {actual}")]
    StatusMismatch {
        /// Step index.
        step: usize,
        /// Status the entry starts from.
        expected: String,
        /// Status the state holds.
        actual: String,
    },

    /// A referenced step does not exist in the plan.
    #[error("step not found: {0}")]
    StepNotFound(usize),

    /// An entry belongs to a different plan.
    #[error("entry for plan {found} applied to plan {expected}")]
    PlanMismatch {
        /// Plan being rebuilt.
        expected: String,
        /// Plan named by the entry.
        found: String,
    },

    /// The entry stream does not start with the plan definition.
    #[error("journal does not start with a plan definition")]
    MissingDefinition,

    /// A second plan definition appeared in one journal.
    #[error("journal contains more than one plan definition")]
    DuplicateDefinition,

    /// A new attempt was opened while another one is still open.
    #[error("step {step}: attempt {attempt} opened while another attempt is open")]
    OverlappingAttempt {
        /// Step index.
        step: usize,
        /// Attempt number of the new record.
        attempt: u32,
    },

    /// A second successful action for the same step.
    #[error("step {step} already has a successful action ({key})")]
    DuplicateSuccess {
        /// Step index.
        step: usize,
        /// Idempotency key of the earlier success.
        key: String,
    },

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
