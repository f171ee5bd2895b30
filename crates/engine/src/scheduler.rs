//! Which steps may start now.

use std::collections::{HashMap, HashSet};

use steward_execution::{PlanState, StepStatus};
use steward_plan::{PlanDefinition, PlanError, PlanGraph};
use tokio::time::Instant;

/// Steps that may start at `now`, in index order.
///
/// A step is eligible when it is `Pending`, not already in flight, past its
/// backoff deadline, every dependency has `Succeeded`, and every step
/// declared earlier with the same target lock has left `Pending`/`Running`.
pub fn eligible(
    definition: &PlanDefinition,
    state: &PlanState,
    in_flight: &HashSet<usize>,
    not_before: &HashMap<usize, Instant>,
    now: Instant,
) -> Vec<usize> {
    definition
        .steps
        .iter()
        .filter(|step| {
            let index = step.index;
            state.steps[index].status == StepStatus::Pending
                && !in_flight.contains(&index)
                && not_before.get(&index).is_none_or(|deadline| *deadline <= now)
                && step
                    .depends_on
                    .iter()
                    .all(|&dep| state.steps[dep].status == StepStatus::Succeeded)
                && definition
                    .lock_predecessors(index)
                    .iter()
                    .all(|&earlier| {
                        !in_flight.contains(&earlier)
                            && !matches!(
                                state.steps[earlier].status,
                                StepStatus::Pending | StepStatus::Running
                            )
                    })
        })
        .map(|step| step.index)
        .collect()
}

/// Earliest backoff deadline after `now` among steps waiting to retry an
/// action or a compensation.
pub fn next_wakeup(
    state: &PlanState,
    not_before: &HashMap<usize, Instant>,
    now: Instant,
) -> Option<Instant> {
    not_before
        .iter()
        .filter(|(index, deadline)| {
            **deadline > now
                && matches!(
                    state.steps[**index].status,
                    StepStatus::Pending | StepStatus::Compensating
                )
        })
        .map(|(_, deadline)| *deadline)
        .min()
}

/// Refuse a definition that could never finish: a dependency running
/// against the declaration order of two steps on the same target lock.
pub fn check_order(definition: &PlanDefinition) -> Result<(), PlanError> {
    let graph = PlanGraph::from_steps(&definition.steps)?.with_lock_order(&definition.steps);
    if graph.has_cycle() {
        return Err(PlanError::CyclicPlan);
    }
    Ok(())
}

/// Steps in the order compensation visits them: reverse topological.
pub fn compensation_order(definition: &PlanDefinition) -> Result<Vec<usize>, PlanError> {
    PlanGraph::from_steps(&definition.steps)?.reverse_topological_order()
}
