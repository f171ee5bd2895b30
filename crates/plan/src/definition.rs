//! Expanded, validated plan definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_core::{Params, PlanId, StepId, TargetLock};

use crate::task::MaintenanceTask;

/// One step of a built plan: an operation bound to concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    /// Position in the plan; part of the step identity.
    pub index: usize,
    /// Template key, used in logs and reports.
    pub key: String,
    /// Registered operation name.
    pub operation: String,
    /// Bound parameters.
    pub params: Params,
    /// Indices of the steps that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Entity this step mutates, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<TargetLock>,
}

/// An immutable plan: a DAG of steps for one maintenance task.
///
/// Persisted once, as the first journal record, and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    /// Plan identity.
    pub id: PlanId,
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
    /// The request the plan was built for.
    pub task: MaintenanceTask,
    /// Name of the template it was expanded from.
    pub template: String,
    /// Steps in declaration order; `steps[i].index == i`.
    pub steps: Vec<PlannedStep>,
}

impl PlanDefinition {
    /// Step by index.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&PlannedStep> {
        self.steps.get(index)
    }

    /// Full identity of step `index`.
    #[must_use]
    pub fn step_id(&self, index: usize) -> StepId {
        StepId::new(self.id, index)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps. Built plans never do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Earlier-declared steps holding the same lock as step `index`.
    ///
    /// A locked step may only start once all of these have finished.
    #[must_use]
    pub fn lock_predecessors(&self, index: usize) -> Vec<usize> {
        let Some(lock) = self.steps.get(index).and_then(|s| s.lock.as_ref()) else {
            return Vec::new();
        };
        self.steps[..index]
            .iter()
            .filter(|s| s.lock.as_ref() == Some(lock))
            .map(|s| s.index)
            .collect()
    }

    /// Steps that list `index` as a dependency.
    #[must_use]
    pub fn dependents(&self, index: usize) -> Vec<usize> {
        self.steps
            .iter()
            .filter(|s| s.depends_on.contains(&index))
            .map(|s| s.index)
            .collect()
    }
}
