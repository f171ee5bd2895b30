#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Engine
//!
//! Drives maintenance plans: schedules ready steps onto a bounded worker
//! pool, serializes calls per target lock, retries within budget, rolls
//! back in reverse dependency order and resolves ambiguous outcomes with
//! reconciliation checks. Every state change is journaled before it is
//! acted on, so a restarted process can [`Orchestrator::resume`] where the
//! last one stopped.
//!
//! - [`Orchestrator`]: entry point (`run`, `resume`, `resume_all`, `cancel`)
//! - [`OrchestratorConfig`]: worker count, retry policy, timeouts
//! - [`PlanReport`]: final state of one plan
//! - [`StatusBoard`]: live snapshots for status queries
//! - [`TargetLocks`]: one in-flight call per node, etcd member or mount

pub mod board;
pub mod config;
mod driver;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod report;
pub mod scheduler;
mod task;

pub use board::{Health, HealthStatus, PlanSnapshot, StatusBoard, StepSnapshot};
pub use config::OrchestratorConfig;
pub use error::EngineError;
pub use locks::{TargetGuard, TargetLocks};
pub use orchestrator::Orchestrator;
pub use report::PlanReport;
