//! Operation registry.

use std::collections::HashMap;
use std::sync::Arc;

use steward_core::TargetKind;

use crate::error::PlanError;
use crate::operation::Operation;

/// Accumulates operations before validation.
///
/// ```
/// use steward_core::TargetKind;
/// use steward_plan::{CommandTemplate, Operation, OperationRegistryBuilder};
///
/// let mut builder = OperationRegistryBuilder::new();
/// builder
///     .register(Operation::new(
///         "restart-kubelet",
///         TargetKind::Host,
///         CommandTemplate::new("systemctl").args(["restart", "kubelet"]),
///     ).idempotent())
///     .unwrap();
/// let registry = builder.build().unwrap();
/// assert!(registry.contains("restart-kubelet"));
/// ```
#[derive(Debug, Default)]
pub struct OperationRegistryBuilder {
    operations: HashMap<String, Arc<Operation>>,
}

impl OperationRegistryBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation. Names are unique.
    pub fn register(&mut self, operation: Operation) -> Result<&mut Self, PlanError> {
        let name = operation.name().to_owned();
        if self.operations.contains_key(&name) {
            return Err(PlanError::DuplicateOperation(name));
        }
        tracing::debug!(operation = %name, kind = %operation.kind(), "registered operation");
        self.operations.insert(name, Arc::new(operation));
        Ok(self)
    }

    /// Validate every declaration and freeze the registry.
    pub fn build(self) -> Result<OperationRegistry, PlanError> {
        let mut names: Vec<&String> = self.operations.keys().collect();
        names.sort();
        for name in names {
            let operation = &self.operations[name];
            if let Some(compensation) = operation.compensation()
                && !self.operations.contains_key(compensation)
            {
                return Err(PlanError::UnknownOperation(compensation.to_owned()));
            }
            check_policy(operation)?;
            check_declared_params(operation)?;
        }
        tracing::info!(operations = self.operations.len(), "operation registry built");
        Ok(OperationRegistry {
            operations: self.operations,
        })
    }
}

fn check_policy(operation: &Operation) -> Result<(), PlanError> {
    let violation = |reason: &str| PlanError::PolicyViolation {
        operation: operation.name().to_owned(),
        reason: reason.to_owned(),
    };
    if operation.attempt_limit() == Some(0) {
        return Err(violation("max attempts must be at least 1"));
    }
    let unverifiable = !operation.is_idempotent() && operation.reconcile().is_none();
    if unverifiable && operation.may_resume_after_ambiguous() {
        return Err(violation(
            "non-idempotent operation without a reconciliation check cannot resume after an ambiguous outcome",
        ));
    }
    if unverifiable
        && operation.kind() == TargetKind::Host
        && operation.attempt_limit().is_some_and(|n| n > 1)
    {
        return Err(violation(
            "non-idempotent host operation without a reconciliation check allows at most one attempt",
        ));
    }
    Ok(())
}

fn check_declared_params(operation: &Operation) -> Result<(), PlanError> {
    let declared = |name: &str| operation.params().iter().any(|p| p.name == name);
    let templates = std::iter::once(operation.command())
        .chain(operation.preconditions().iter().map(|p| &p.command))
        .chain(operation.reconcile().map(|p| &p.command));
    for template in templates {
        for name in template.placeholders()? {
            if !declared(&name) {
                return Err(PlanError::UndeclaredParameter {
                    operation: operation.name().to_owned(),
                    param: name,
                });
            }
        }
    }
    if let Some(lock) = operation.lock_spec()
        && !declared(&lock.param)
    {
        return Err(PlanError::UndeclaredParameter {
            operation: operation.name().to_owned(),
            param: lock.param.clone(),
        });
    }
    Ok(())
}

/// Immutable catalog of operations, shared by `Arc` across the engine.
///
/// Built once by [`OperationRegistryBuilder::build`]; readers never need
/// synchronisation.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<Operation>>,
}

impl OperationRegistry {
    /// Look up an operation by name.
    pub fn lookup(&self, name: &str) -> Result<&Arc<Operation>, PlanError> {
        self.operations
            .get(name)
            .ok_or_else(|| PlanError::UnknownOperation(name.to_owned()))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Sorted operation names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
