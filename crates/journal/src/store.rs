//! The journal port implemented by every backend.

use async_trait::async_trait;
use steward_core::PlanId;
use steward_execution::{ExecutionError, JournalEntry, ReplayedPlan, replay};
use steward_plan::PlanDefinition;

use crate::error::{JournalCorruption, JournalError};

/// Append-only, per-plan event log.
///
/// Every append is durable when the call returns: the orchestrator writes
/// an attempt record before calling out and does not proceed until the
/// journal has it.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Start a journal for a freshly built plan. The definition becomes
    /// the first entry.
    async fn create(&self, definition: &PlanDefinition) -> Result<(), JournalError>;

    /// Append one entry to an existing plan.
    async fn append(&self, plan_id: PlanId, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Read a plan's entries, dropping a corrupt tail if one is found.
    async fn load_plan(&self, plan_id: PlanId) -> Result<LoadedPlan, JournalError>;

    /// Every plan with a journal, in id order.
    async fn list_plans(&self) -> Result<Vec<PlanId>, JournalError>;
}

/// The readable prefix of a plan's journal.
#[derive(Debug, Clone)]
pub struct LoadedPlan {
    /// Plan identity.
    pub plan_id: PlanId,
    /// Entries in append order, the definition first.
    pub entries: Vec<JournalEntry>,
    /// The tail that was discarded, if any.
    pub corruption: Option<JournalCorruption>,
}

impl LoadedPlan {
    /// Rebuild definition and state from the entries.
    pub fn replay(&self) -> Result<ReplayedPlan, ExecutionError> {
        replay(&self.entries)
    }

    /// Returns `true` if part of the journal was discarded.
    pub fn is_truncated(&self) -> bool {
        self.corruption.is_some()
    }
}

/// The `PlanCreated` entry that opens a plan's journal.
pub(crate) fn created_entry(definition: &PlanDefinition) -> JournalEntry {
    JournalEntry::PlanCreated {
        timestamp: definition.created_at,
        definition: definition.clone(),
    }
}

/// Check that the first loaded entry defines `plan_id`.
pub(crate) fn check_first(plan_id: PlanId, entries: &[JournalEntry]) -> Result<(), JournalError> {
    match entries.first() {
        Some(JournalEntry::PlanCreated { definition, .. }) if definition.id == plan_id => Ok(()),
        Some(JournalEntry::PlanCreated { definition, .. }) => Err(JournalError::PlanMismatch {
            expected: plan_id,
            found: definition.id,
        }),
        _ => Err(JournalError::MissingDefinition(plan_id)),
    }
}
