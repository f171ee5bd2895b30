//! Read-only plan snapshots for status queries.
//!
//! The orchestrator publishes a fresh immutable snapshot after every
//! journaled change; readers clone an `Arc` and never wait on a plan.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use steward_core::{PlanId, TargetLock};
use steward_execution::{AttemptKind, PlanState, PlanStatus, StepFlag, StepStatus};
use steward_plan::{PlanDefinition, TaskKind};

/// One step as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    /// Position in the plan.
    pub index: usize,
    /// Template key.
    pub key: String,
    /// Operation name.
    pub operation: String,
    /// Current status.
    pub status: StepStatus,
    /// Action attempts so far.
    pub attempts: u32,
    /// Compensation attempts so far.
    pub compensation_attempts: u32,
    /// Target lock, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<TargetLock>,
    /// Latest failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Operator flags, verbatim.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<StepFlag>,
}

/// One plan as reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSnapshot {
    /// Plan identity.
    pub plan_id: PlanId,
    /// Caller-supplied request id.
    pub request_id: String,
    /// Task kind.
    pub task: TaskKind,
    /// Template the plan was built from.
    pub template: String,
    /// Derived plan status.
    pub status: PlanStatus,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the plan last changed.
    pub updated_at: DateTime<Utc>,
    /// Cancellation reason, once requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_requested: Option<String>,
    /// Steps in plan order.
    pub steps: Vec<StepSnapshot>,
}

impl PlanSnapshot {
    /// Capture `state` of the plan `definition`.
    pub fn capture(definition: &PlanDefinition, state: &PlanState) -> Self {
        let steps = definition
            .steps
            .iter()
            .zip(&state.steps)
            .map(|(step, s)| StepSnapshot {
                index: step.index,
                key: step.key.clone(),
                operation: step.operation.clone(),
                status: s.status,
                attempts: s.attempts(AttemptKind::Action),
                compensation_attempts: s.attempts(AttemptKind::Compensation),
                lock: step.lock.clone(),
                last_error: s.last_error().map(str::to_owned),
                flags: s.flags.clone(),
            })
            .collect();
        Self {
            plan_id: definition.id,
            request_id: definition.task.request_id.clone(),
            task: definition.task.kind,
            template: definition.template.clone(),
            status: state.status(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            cancel_requested: state.cancel_requested.clone(),
            steps,
        }
    }

    /// Steps currently in `status`.
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Steps an operator has to look at.
    pub fn flagged(&self) -> impl Iterator<Item = &StepSnapshot> {
        self.steps.iter().filter(|s| !s.flags.is_empty())
    }
}

/// Overall verdict of [`StatusBoard::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Nothing waits for an operator.
    Ok,
    /// At least one plan needs operator review.
    Degraded,
}

/// Process health as served on `/healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Verdict.
    pub status: HealthStatus,
    /// Plans known to this process.
    pub plans: usize,
    /// Plans not yet in a terminal status.
    pub active: usize,
    /// Plans waiting for an operator.
    pub needs_review: Vec<PlanId>,
}

/// Latest snapshot of every plan this process has touched.
#[derive(Debug, Default)]
pub struct StatusBoard {
    plans: DashMap<PlanId, Arc<PlanSnapshot>>,
}

impl StatusBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot of `snapshot.plan_id`.
    pub fn publish(&self, snapshot: PlanSnapshot) {
        self.plans.insert(snapshot.plan_id, Arc::new(snapshot));
    }

    /// Latest snapshot of one plan.
    pub fn snapshot(&self, plan_id: PlanId) -> Option<Arc<PlanSnapshot>> {
        self.plans.get(&plan_id).map(|entry| Arc::clone(entry.value()))
    }

    /// All snapshots, oldest plan first.
    pub fn list(&self) -> Vec<Arc<PlanSnapshot>> {
        let mut plans: Vec<_> = self
            .plans
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        plans.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.plan_id.cmp(&b.plan_id))
        });
        plans
    }

    /// Aggregate health.
    pub fn health(&self) -> Health {
        let plans = self.list();
        let needs_review: Vec<PlanId> = plans
            .iter()
            .filter(|p| p.status == PlanStatus::NeedsOperatorReview)
            .map(|p| p.plan_id)
            .collect();
        Health {
            status: if needs_review.is_empty() {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            plans: plans.len(),
            active: plans.iter().filter(|p| p.status.is_active()).count(),
            needs_review,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use steward_core::Params;
    use steward_execution::ReviewReason;
    use steward_plan::{MaintenanceTask, PlannedStep};

    fn definition() -> PlanDefinition {
        PlanDefinition {
            id: PlanId::new(),
            created_at: Utc::now(),
            task: MaintenanceTask::new("req-7", TaskKind::DrainNode),
            template: "drain-node".into(),
            steps: vec![PlannedStep {
                index: 0,
                key: "cordon".into(),
                operation: "cordon-node".into(),
                params: Params::new(),
                depends_on: vec![],
                lock: Some(TargetLock::node("w1").unwrap()),
            }],
        }
    }

    #[test]
    fn capture_reports_steps() {
        let def = definition();
        let state = PlanState::new(&def);
        let snapshot = PlanSnapshot::capture(&def, &state);
        assert_eq!(snapshot.status, PlanStatus::Building);
        assert_eq!(snapshot.request_id, "req-7");
        assert_eq!(snapshot.count(StepStatus::Pending), 1);
        assert_eq!(snapshot.steps[0].lock.as_ref().map(TargetLock::as_str), Some("node/w1"));
        assert_eq!(snapshot.flagged().count(), 0);
    }

    #[test]
    fn health_degrades_on_review() {
        let board = StatusBoard::new();
        let def = definition();
        let mut state = PlanState::new(&def);
        board.publish(PlanSnapshot::capture(&def, &state));
        assert_eq!(board.health().status, HealthStatus::Ok);
        assert_eq!(board.health().active, 1);

        state.steps[0].status = StepStatus::Running;
        state.steps[0].runs = 1;
        state.steps[0].flags.push(StepFlag::NeedsReview {
            reason: ReviewReason::InterruptedAttempt,
            detail: "restart".into(),
        });
        board.publish(PlanSnapshot::capture(&def, &state));

        let health = board.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.needs_review, vec![def.id]);
        assert_eq!(health.active, 0);
        assert_eq!(board.list().len(), 1);
        assert!(board.snapshot(def.id).is_some());
        assert!(board.snapshot(PlanId::new()).is_none());
    }

    #[test]
    fn snapshot_serializes_flags_verbatim() {
        let def = definition();
        let mut state = PlanState::new(&def);
        state.steps[0].flags.push(StepFlag::Uncompensated {
            detail: "no compensation declared".into(),
        });
        let json = serde_json::to_value(PlanSnapshot::capture(&def, &state)).unwrap();
        assert_eq!(json["steps"][0]["flags"][0]["flag"], "uncompensated");
        assert_eq!(json["task"], "drain-node");
    }
}
