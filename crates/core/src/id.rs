//! Unique identifiers for Steward entities.
//!
//! Plans are identified by a domain-typed UUID ([`PlanId`]) so they cannot be
//! confused with other UUIDs flowing through the system. A step has no
//! identity of its own outside its plan: [`StepId`] pairs the plan id with the
//! step's position in the plan.

use std::fmt;

use domain_key::define_uuid;
use serde::{Deserialize, Serialize};

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub PlanIdDomain => PlanId);

/// Identity of one step: the owning plan plus the step's index in that plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId {
    /// Plan the step belongs to.
    pub plan_id: PlanId,
    /// Zero-based position of the step in the plan.
    pub index: usize,
}

impl StepId {
    /// Create a step identity.
    #[must_use]
    pub fn new(plan_id: PlanId, index: usize) -> Self {
        Self { plan_id, index }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.plan_id, self.index)
    }
}
