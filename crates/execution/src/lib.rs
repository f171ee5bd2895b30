#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Execution
//!
//! Execution-time state of plans. This crate does NOT run anything; it
//! defines what the orchestrator records and how state is rebuilt:
//!
//! - [`StepStatus`] and [`PlanStatus`], with transitions validated by the
//!   [`transition`] module
//! - [`StepState`] and [`PlanState`], and [`derive_plan_status`], which makes
//!   plan status a pure function of step states
//! - [`ExecutionRecord`]: one durable record per attempt
//! - [`JournalEntry`]: the write-ahead log of a plan
//! - [`replay`](replay::replay): definition and state from entries alone
//! - [`IdempotencyKey`] and [`IdempotencyLedger`]: at most one effective
//!   success per step

pub mod error;
pub mod idempotency;
pub mod journal;
pub mod record;
pub mod replay;
pub mod state;
pub mod status;
pub mod transition;

pub use error::ExecutionError;
pub use idempotency::{IdempotencyKey, IdempotencyLedger};
pub use journal::JournalEntry;
pub use record::{
    AttemptKind, AttemptOutcome, ExecutionRecord, FailureCategory, OUTPUT_SNAPSHOT_LIMIT,
    OutputSnapshot,
};
pub use replay::{ReplayedPlan, replay};
pub use state::{PlanState, ReviewReason, StepFlag, StepState, derive_plan_status};
pub use status::{PlanStatus, StepStatus};
