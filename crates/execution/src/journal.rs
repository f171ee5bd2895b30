//! Journal entries: the write-ahead log of a plan.
//!
//! The entry stream alone is enough to rebuild a plan's definition and
//! state (see [`replay`](crate::replay)).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_plan::PlanDefinition;

use crate::record::ExecutionRecord;
use crate::state::StepFlag;
use crate::status::{PlanStatus, StepStatus};

/// A journal entry recording one durable event of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// The plan was built. Always the first entry.
    PlanCreated {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The full, immutable plan.
        definition: PlanDefinition,
    },

    /// An attempt was opened (before the call) or closed (after it).
    Attempt {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The record, open or closed.
        record: ExecutionRecord,
    },

    /// A step changed status.
    StepTransitioned {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Step index.
        step: usize,
        /// Previous status.
        from: StepStatus,
        /// New status.
        to: StepStatus,
        /// Why, for operators.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A step was flagged for operator attention.
    StepFlagged {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Step index.
        step: usize,
        /// The flag.
        flag: StepFlag,
    },

    /// The derived plan status changed.
    PlanTransitioned {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Previous status.
        from: PlanStatus,
        /// New status.
        to: PlanStatus,
    },

    /// A cancellation was requested.
    CancellationRequested {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// Reason for cancellation.
        reason: String,
    },
}

impl JournalEntry {
    /// A `StepTransitioned` entry stamped now.
    #[must_use]
    pub fn step_transitioned(step: usize, from: StepStatus, to: StepStatus, reason: Option<String>) -> Self {
        Self::StepTransitioned {
            timestamp: Utc::now(),
            step,
            from,
            to,
            reason,
        }
    }

    /// An `Attempt` entry stamped now.
    #[must_use]
    pub fn attempt(record: ExecutionRecord) -> Self {
        Self::Attempt {
            timestamp: Utc::now(),
            record,
        }
    }

    /// A `StepFlagged` entry stamped now.
    #[must_use]
    pub fn step_flagged(step: usize, flag: StepFlag) -> Self {
        Self::StepFlagged {
            timestamp: Utc::now(),
            step,
            flag,
        }
    }

    /// Get the timestamp of this entry.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PlanCreated { timestamp, .. }
            | Self::Attempt { timestamp, .. }
            | Self::StepTransitioned { timestamp, .. }
            | Self::StepFlagged { timestamp, .. }
            | Self::PlanTransitioned { timestamp, .. }
            | Self::CancellationRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get the step index this entry is about, if any.
    #[must_use]
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::Attempt { record, .. } => Some(record.step.index),
            Self::StepTransitioned { step, .. } | Self::StepFlagged { step, .. } => Some(*step),
            Self::PlanCreated { .. }
            | Self::PlanTransitioned { .. }
            | Self::CancellationRequested { .. } => None,
        }
    }

    /// Short event name for logs.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PlanCreated { .. } => "plan_created",
            Self::Attempt { .. } => "attempt",
            Self::StepTransitioned { .. } => "step_transitioned",
            Self::StepFlagged { .. } => "step_flagged",
            Self::PlanTransitioned { .. } => "plan_transitioned",
            Self::CancellationRequested { .. } => "cancellation_requested",
        }
    }

    /// Serialize this entry to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an entry from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttemptKind, AttemptOutcome, OutputSnapshot};
    use crate::state::ReviewReason;
    use steward_core::{PlanId, StepId};

    #[test]
    fn step_accessor() {
        let record = ExecutionRecord::open(StepId::new(PlanId::new(), 3), "op", AttemptKind::Action, 1);
        assert_eq!(JournalEntry::attempt(record).step(), Some(3));
        let entry = JournalEntry::CancellationRequested {
            timestamp: Utc::now(),
            reason: "operator".into(),
        };
        assert_eq!(entry.step(), None);
        assert_eq!(entry.event_name(), "cancellation_requested");
    }

    #[test]
    fn json_is_tagged_by_event() {
        let entry = JournalEntry::step_transitioned(1, StepStatus::Pending, StepStatus::Running, None);
        let json = entry.to_json().unwrap();
        assert!(json.contains("\"event\":\"step_transitioned\""));
        assert!(!json.contains("reason"));
        assert_eq!(JournalEntry::from_json(&json).unwrap(), entry);
    }

    #[test]
    fn serde_roundtrip_flag_and_attempt() {
        let record = ExecutionRecord::open(StepId::new(PlanId::new(), 0), "op", AttemptKind::Action, 1)
            .close(AttemptOutcome::Succeeded {
                output: OutputSnapshot::default(),
            });
        let entries = [
            JournalEntry::attempt(record),
            JournalEntry::step_flagged(
                0,
                StepFlag::NeedsReview {
                    reason: ReviewReason::AmbiguousOutcome,
                    detail: "timed out".into(),
                },
            ),
            JournalEntry::PlanTransitioned {
                timestamp: Utc::now(),
                from: PlanStatus::Executing,
                to: PlanStatus::NeedsOperatorReview,
            },
        ];
        for entry in &entries {
            let back = JournalEntry::from_json(&entry.to_json().unwrap()).unwrap();
            assert_eq!(&back, entry);
            assert_eq!(back.timestamp(), entry.timestamp());
        }
    }
}
