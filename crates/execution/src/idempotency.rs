//! Idempotency keys and the per-plan success ledger.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use steward_core::StepId;

use crate::error::ExecutionError;
use crate::record::AttemptKind;

/// A deterministic key naming one attempt of one step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Generate the key for attempt `attempt` of `kind` on `step`.
    #[must_use]
    pub fn generate(step: StepId, kind: AttemptKind, attempt: u32) -> Self {
        Self(format!("{step}:{kind}:{attempt}"))
    }

    /// Get the underlying key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which attempts have been journaled and which steps already took effect.
///
/// Rebuilt from the journal on resume, so a step whose action succeeded
/// before a crash is never run again.
#[derive(Debug, Default, Clone)]
pub struct IdempotencyLedger {
    seen: HashSet<IdempotencyKey>,
    succeeded: HashMap<usize, IdempotencyKey>,
}

impl IdempotencyLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key as used.
    ///
    /// Returns `true` if this is a new key, `false` for a duplicate.
    pub fn check_and_mark(&mut self, key: &IdempotencyKey) -> bool {
        self.seen.insert(key.clone())
    }

    /// Check if a key has been used without marking it.
    #[must_use]
    pub fn is_seen(&self, key: &IdempotencyKey) -> bool {
        self.seen.contains(key)
    }

    /// Record that the action of step `index` took effect under `key`.
    ///
    /// A second, different success for the same step is an error: it would
    /// mean a non-idempotent action ran twice.
    pub fn record_success(&mut self, index: usize, key: &IdempotencyKey) -> Result<(), ExecutionError> {
        match self.succeeded.get(&index) {
            Some(existing) if existing != key => Err(ExecutionError::DuplicateSuccess {
                step: index,
                key: existing.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.succeeded.insert(index, key.clone());
                Ok(())
            }
        }
    }

    /// Forget the success of step `index`, after it has been compensated.
    pub fn clear_success(&mut self, index: usize) {
        self.succeeded.remove(&index);
    }

    /// Key of the effective success of step `index`, if any.
    #[must_use]
    pub fn success_of(&self, index: usize) -> Option<&IdempotencyKey> {
        self.succeeded.get(&index)
    }

    /// Number of keys seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::PlanId;

    fn step() -> StepId {
        StepId::new(PlanId::new(), 0)
    }

    #[test]
    fn generate_deterministic_key() {
        let step = step();
        assert_eq!(
            IdempotencyKey::generate(step, AttemptKind::Action, 1),
            IdempotencyKey::generate(step, AttemptKind::Action, 1)
        );
        assert_ne!(
            IdempotencyKey::generate(step, AttemptKind::Action, 1),
            IdempotencyKey::generate(step, AttemptKind::Compensation, 1)
        );
    }

    #[test]
    fn key_display() {
        let step = step();
        let key = IdempotencyKey::generate(step, AttemptKind::Reconciliation, 2);
        assert_eq!(key.to_string(), format!("{step}:reconciliation:2"));
    }

    #[test]
    fn check_and_mark() {
        let mut ledger = IdempotencyLedger::new();
        let key = IdempotencyKey::generate(step(), AttemptKind::Action, 1);
        assert!(ledger.check_and_mark(&key));
        assert!(!ledger.check_and_mark(&key));
        assert!(ledger.is_seen(&key));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn second_success_rejected() {
        let step = step();
        let mut ledger = IdempotencyLedger::new();
        let first = IdempotencyKey::generate(step, AttemptKind::Action, 1);
        let second = IdempotencyKey::generate(step, AttemptKind::Action, 2);
        ledger.record_success(0, &first).unwrap();
        ledger.record_success(0, &first).unwrap();
        assert!(matches!(
            ledger.record_success(0, &second),
            Err(ExecutionError::DuplicateSuccess { step: 0, .. })
        ));
        ledger.clear_success(0);
        assert!(ledger.success_of(0).is_none());
        ledger.record_success(0, &second).unwrap();
    }

    #[test]
    fn serde_is_a_plain_string() {
        let key = IdempotencyKey::generate(step(), AttemptKind::Action, 3);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{key}\""));
    }
}
