//! # Steward Core
//!
//! Core types shared by every Steward crate.
//!
//! ## Key Components
//!
//! - **Identifiers**: [`PlanId`] and [`StepId`]
//! - **Targets**: [`TargetKind`] and [`TargetLock`], the mutual-exclusion key
//!   serializing steps that mutate the same node, etcd member or mount
//! - **Parameters**: [`ParamSpec`], [`ParamKind`] and [`Params`] for typed,
//!   named operation inputs
//! - **Constants**: node annotation keys used by the agent loop
//!
//! ## Usage
//!
//! ```rust
//! use steward_core::{Params, PlanId, StepId, TargetLock};
//!
//! let plan_id = PlanId::new();
//! let step = StepId::new(plan_id, 0);
//! let lock = TargetLock::node("worker-1").unwrap();
//! let params = Params::new().with("node", "worker-1");
//! ```

pub mod constants;
pub mod id;
pub mod param;
pub mod target;

pub use id::{PlanId, StepId, UuidParseError};
pub use param::{ParamError, ParamKind, ParamSpec, Params};
pub use target::{TargetKind, TargetLock, TargetLockError};
