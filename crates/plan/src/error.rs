//! Plan-layer error types.

use steward_core::{ParamError, TargetLockError};
use thiserror::Error;

/// Errors from the operation registry, the task templates and the plan
/// builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// An operation with the same name is already registered.
    #[error("duplicate operation: {0}")]
    DuplicateOperation(String),

    /// No operation is registered under the given name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// A template step references an operation absent from the registry.
    #[error("template step `{step}` references unknown operation `{operation}`")]
    UnresolvedOperation {
        /// Template step key.
        step: String,
        /// The missing operation name.
        operation: String,
    },

    /// An operation declaration breaks the ambiguity policy.
    #[error("operation `{operation}` violates policy: {reason}")]
    PolicyViolation {
        /// Offending operation.
        operation: String,
        /// Which rule was broken.
        reason: String,
    },

    /// A template or lock of an operation uses a parameter it never declares.
    #[error("operation `{operation}` uses undeclared parameter `{param}`")]
    UndeclaredParameter {
        /// Offending operation.
        operation: String,
        /// The undeclared name.
        param: String,
    },

    /// The expanded plan contains a dependency cycle.
    #[error("plan contains a dependency cycle")]
    CyclicPlan,

    /// A step depends on a key that is not part of the template.
    #[error("step `{step}` depends on unknown step `{dependency}`")]
    UnknownDependency {
        /// The dependent step.
        step: String,
        /// The missing dependency key.
        dependency: String,
    },

    /// Two template steps share a key.
    #[error("duplicate step key `{0}`")]
    DuplicateStep(String),

    /// A template expanded to no steps.
    #[error("plan has no steps")]
    EmptyPlan,

    /// A step's parameters do not satisfy the operation's declaration.
    #[error("step `{step}` ({operation}): {source}")]
    InvalidParameter {
        /// Template step key.
        step: String,
        /// Operation name.
        operation: String,
        /// The underlying parameter error.
        #[source]
        source: ParamError,
    },

    /// A command template references a parameter that is not bound.
    #[error("unbound placeholder `{{{name}}}` in `{template}`")]
    UnboundPlaceholder {
        /// Placeholder name.
        name: String,
        /// The template text.
        template: String,
    },

    /// A command template is malformed.
    #[error("malformed template `{0}`")]
    MalformedTemplate(String),

    /// A target lock could not be derived from the bound parameters.
    #[error("step `{step}`: invalid target lock: {source}")]
    InvalidLock {
        /// Template step key.
        step: String,
        /// The underlying lock error.
        #[source]
        source: TargetLockError,
    },

    /// A task descriptor is missing data its template needs.
    #[error("invalid task: {0}")]
    InvalidTask(String),
}
