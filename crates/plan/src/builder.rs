//! Expands maintenance tasks into validated plan definitions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use steward_core::{Params, PlanId};

use crate::definition::{PlanDefinition, PlannedStep};
use crate::error::PlanError;
use crate::graph::PlanGraph;
use crate::operation::Operation;
use crate::registry::OperationRegistry;
use crate::task::MaintenanceTask;
use crate::template::{PlanTemplate, TemplateStep};

/// Turns tasks and templates into [`PlanDefinition`]s against a registry.
///
/// ```
/// use steward_plan::catalog::{CatalogConfig, standard_registry};
/// use steward_plan::{MaintenanceTask, PlanBuilder, TaskKind};
///
/// let registry = standard_registry(&CatalogConfig::default()).unwrap();
/// let task = MaintenanceTask::new("op-1", TaskKind::DrainNode).with("node", "worker-1");
/// let plan = PlanBuilder::new(&registry).build(&task).unwrap();
/// assert_eq!(plan.steps.len(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PlanBuilder<'a> {
    registry: &'a OperationRegistry,
}

impl<'a> PlanBuilder<'a> {
    /// Builder over `registry`.
    #[must_use]
    pub fn new(registry: &'a OperationRegistry) -> Self {
        Self { registry }
    }

    /// Expand a built-in task with a fresh plan id.
    pub fn build(&self, task: &MaintenanceTask) -> Result<PlanDefinition, PlanError> {
        let template = PlanTemplate::for_task(task)?;
        self.build_from_template(task, &template)
    }

    /// Expand an arbitrary template with a fresh plan id.
    pub fn build_from_template(
        &self,
        task: &MaintenanceTask,
        template: &PlanTemplate,
    ) -> Result<PlanDefinition, PlanError> {
        self.assemble(PlanId::new(), Utc::now(), task, template)
    }

    /// Expand `template` into a plan with the given identity.
    ///
    /// Deterministic: the same inputs always produce the same plan or the
    /// same error.
    pub fn assemble(
        &self,
        id: PlanId,
        created_at: DateTime<Utc>,
        task: &MaintenanceTask,
        template: &PlanTemplate,
    ) -> Result<PlanDefinition, PlanError> {
        if template.steps.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(template.steps.len());
        for (index, step) in template.steps.iter().enumerate() {
            if positions.insert(step.key.as_str(), index).is_some() {
                return Err(PlanError::DuplicateStep(step.key.clone()));
            }
        }

        let mut steps = Vec::with_capacity(template.steps.len());
        for (index, step) in template.steps.iter().enumerate() {
            let operation = self.registry.lookup(&step.operation).map_err(|_| {
                PlanError::UnresolvedOperation {
                    step: step.key.clone(),
                    operation: step.operation.clone(),
                }
            })?;
            self.check_bindings(step, operation)?;

            let lock = operation
                .lock_spec()
                .map(|spec| spec.resolve(&step.params))
                .transpose()
                .map_err(|source| PlanError::InvalidLock {
                    step: step.key.clone(),
                    source,
                })?;

            let mut depends_on = Vec::with_capacity(step.depends_on.len());
            for key in &step.depends_on {
                let dependency =
                    positions
                        .get(key.as_str())
                        .ok_or_else(|| PlanError::UnknownDependency {
                            step: step.key.clone(),
                            dependency: key.clone(),
                        })?;
                if !depends_on.contains(dependency) {
                    depends_on.push(*dependency);
                }
            }

            steps.push(PlannedStep {
                index,
                key: step.key.clone(),
                operation: step.operation.clone(),
                params: step.params.clone(),
                depends_on,
                lock,
            });
        }

        let graph = PlanGraph::from_steps(&steps)?.with_lock_order(&steps);
        if graph.has_cycle() {
            return Err(PlanError::CyclicPlan);
        }

        tracing::debug!(
            plan_id = %id,
            template = %template.name,
            steps = steps.len(),
            "plan built"
        );
        Ok(PlanDefinition {
            id,
            created_at,
            task: task.clone(),
            template: template.name.clone(),
            steps,
        })
    }

    /// Typed parameter check plus a trial render of every command the step
    /// may run, including its compensation.
    fn check_bindings(&self, step: &TemplateStep, operation: &Operation) -> Result<(), PlanError> {
        check_operation(step, operation, &step.params)?;
        if let Some(name) = operation.compensation() {
            let compensation = self.registry.lookup(name)?;
            check_operation(step, compensation, &step.params)?;
        }
        Ok(())
    }
}

fn check_operation(
    step: &TemplateStep,
    operation: &Operation,
    params: &Params,
) -> Result<(), PlanError> {
    params
        .check(operation.params())
        .map_err(|source| PlanError::InvalidParameter {
            step: step.key.clone(),
            operation: operation.name().to_owned(),
            source,
        })?;
    operation.command().render(params)?;
    for probe in operation.preconditions().iter().chain(operation.reconcile()) {
        probe.render(params)?;
    }
    Ok(())
}
