//! In-memory journal for tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use steward_core::PlanId;
use steward_execution::JournalEntry;
use steward_plan::PlanDefinition;

use crate::error::JournalError;
use crate::store::{Journal, LoadedPlan, created_entry};

/// Journal keeping every plan in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    plans: RwLock<BTreeMap<PlanId, Vec<JournalEntry>>>,
}

impl MemoryJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a plan's entries.
    pub fn entries(&self, plan_id: PlanId) -> Option<Vec<JournalEntry>> {
        self.plans.read().get(&plan_id).cloned()
    }

    /// Drop the last `n` entries of a plan, simulating a crash before they
    /// reached the disk.
    pub fn truncate_tail(&self, plan_id: PlanId, n: usize) {
        if let Some(entries) = self.plans.write().get_mut(&plan_id) {
            let keep = entries.len().saturating_sub(n).max(1);
            entries.truncate(keep);
        }
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn create(&self, definition: &PlanDefinition) -> Result<(), JournalError> {
        let mut plans = self.plans.write();
        if plans.contains_key(&definition.id) {
            return Err(JournalError::PlanExists(definition.id));
        }
        plans.insert(definition.id, vec![created_entry(definition)]);
        Ok(())
    }

    async fn append(&self, plan_id: PlanId, entry: &JournalEntry) -> Result<(), JournalError> {
        self.plans
            .write()
            .get_mut(&plan_id)
            .ok_or(JournalError::PlanNotFound(plan_id))?
            .push(entry.clone());
        Ok(())
    }

    async fn load_plan(&self, plan_id: PlanId) -> Result<LoadedPlan, JournalError> {
        let entries = self
            .entries(plan_id)
            .ok_or(JournalError::PlanNotFound(plan_id))?;
        Ok(LoadedPlan {
            plan_id,
            entries,
            corruption: None,
        })
    }

    async fn list_plans(&self) -> Result<Vec<PlanId>, JournalError> {
        Ok(self.plans.read().keys().copied().collect())
    }
}
