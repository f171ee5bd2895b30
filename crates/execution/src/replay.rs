//! Rebuild a plan from its journal entries.

use steward_plan::PlanDefinition;

use crate::error::ExecutionError;
use crate::journal::JournalEntry;
use crate::state::PlanState;

/// A plan rebuilt from the journal.
#[derive(Debug, Clone)]
pub struct ReplayedPlan {
    /// The immutable definition from the first entry.
    pub definition: PlanDefinition,
    /// State after applying every following entry.
    pub state: PlanState,
    /// Number of entries applied, the definition included.
    pub entries: usize,
}

/// Replay `entries`, which must start with [`JournalEntry::PlanCreated`].
///
/// Replay is strict: an entry that does not fit the state built so far is
/// an error, because the journal is written by a single driver that
/// validates every transition before appending it.
pub fn replay<'a, I>(entries: I) -> Result<ReplayedPlan, ExecutionError>
where
    I: IntoIterator<Item = &'a JournalEntry>,
{
    let mut entries = entries.into_iter();
    let Some(JournalEntry::PlanCreated { definition, .. }) = entries.next() else {
        return Err(ExecutionError::MissingDefinition);
    };

    let mut state = PlanState::new(definition);
    let mut applied = 1;
    for entry in entries {
        state.apply(entry)?;
        applied += 1;
    }
    Ok(ReplayedPlan {
        definition: definition.clone(),
        state,
        entries: applied,
    })
}
