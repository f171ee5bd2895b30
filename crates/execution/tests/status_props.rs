//! Property tests for plan status derivation

use proptest::prelude::*;
use steward_execution::{PlanStatus, ReviewReason, StepFlag, StepState, StepStatus, derive_plan_status};

fn arb_status() -> impl Strategy<Value = StepStatus> {
    prop_oneof![
        Just(StepStatus::Pending),
        Just(StepStatus::Running),
        Just(StepStatus::Succeeded),
        Just(StepStatus::Failed),
        Just(StepStatus::Compensating),
        Just(StepStatus::Compensated),
        Just(StepStatus::Abandoned),
    ]
}

fn arb_flag() -> impl Strategy<Value = Option<StepFlag>> {
    prop_oneof![
        6 => Just(None),
        1 => Just(Some(StepFlag::Uncompensated {
            detail: "compensation failed".into(),
        })),
        1 => Just(Some(StepFlag::NeedsReview {
            reason: ReviewReason::AmbiguousOutcome,
            detail: "timed out".into(),
        })),
    ]
}

fn arb_step() -> impl Strategy<Value = StepState> {
    (arb_status(), 0u32..3, arb_flag()).prop_map(|(status, runs, flag)| StepState {
        status,
        runs: if status == StepStatus::Pending { runs } else { runs.max(1) },
        flags: flag.into_iter().collect(),
        ..StepState::new()
    })
}

fn arb_steps() -> impl Strategy<Value = Vec<StepState>> {
    prop::collection::vec(arb_step(), 1..8)
}

proptest! {
    /// A needs-review flag anywhere always wins.
    #[test]
    fn review_flag_forces_operator_review(mut steps in arb_steps(), at in any::<prop::sample::Index>()) {
        let i = at.index(steps.len());
        steps[i].flags.push(StepFlag::NeedsReview {
            reason: ReviewReason::InterruptedAttempt,
            detail: "process stopped".into(),
        });
        prop_assert_eq!(derive_plan_status(&steps), PlanStatus::NeedsOperatorReview);
    }

    /// Succeeded exactly when every step succeeded and nothing needs review.
    #[test]
    fn succeeded_iff_all_steps_succeeded(steps in arb_steps()) {
        let all = steps.iter().all(|s| s.status == StepStatus::Succeeded);
        let review = steps.iter().any(StepState::needs_review);
        prop_assert_eq!(
            derive_plan_status(&steps) == PlanStatus::Succeeded,
            all && !review
        );
    }

    /// RolledBack means nothing is in flight and no success is left standing.
    #[test]
    fn rolled_back_is_quiescent(steps in arb_steps()) {
        if derive_plan_status(&steps) == PlanStatus::RolledBack {
            for s in &steps {
                prop_assert!(
                    matches!(s.status, StepStatus::Failed | StepStatus::Compensated | StepStatus::Abandoned),
                    "unexpected {:?} in a rolled back plan", s.status
                );
                prop_assert!(s.flags.is_empty());
            }
        }
    }

    /// Building means no step has ever been started.
    #[test]
    fn building_means_untouched(steps in arb_steps()) {
        if derive_plan_status(&steps) == PlanStatus::Building {
            prop_assert!(steps.iter().all(|s| s.status == StepStatus::Pending && s.runs == 0));
        }
    }

    /// Without failures the plan is never in a rollback state.
    #[test]
    fn no_failure_no_rollback(steps in arb_steps()) {
        let failure = steps.iter().any(|s| s.status.is_failure());
        let status = derive_plan_status(&steps);
        if !failure && !steps.iter().any(StepState::needs_review) {
            prop_assert!(
                matches!(status, PlanStatus::Building | PlanStatus::Executing | PlanStatus::Succeeded),
                "got {:?}", status
            );
        }
    }

    /// Derivation depends on the set of step states, not their order.
    #[test]
    fn order_independent(steps in arb_steps()) {
        let mut reversed = steps.clone();
        reversed.reverse();
        prop_assert_eq!(derive_plan_status(&steps), derive_plan_status(&reversed));
    }
}
