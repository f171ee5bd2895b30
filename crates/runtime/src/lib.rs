#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Runtime
//!
//! The command executor: runs one external call under a deadline and
//! classifies the result.
//!
//! - [`CommandExecutor`]: the port the orchestrator calls
//! - [`ProcessExecutor`]: spawns `kubectl`, `etcdctl` and host binaries
//! - [`Outcome`]: `Success`, `Retryable` or `Fatal`, with a [`Failure`]
//!   category
//! - [`classify`](classify::classify): exit status and stderr to outcome
//! - [`TimeoutConfig`]: deadlines per target kind
//! - [`judge`](probe::judge): probe outcome against its expectation
//!
//! With the `test-util` feature, `ScriptedExecutor` replays scripted
//! outcomes and records when each call ran.

pub mod classify;
pub mod executor;
pub mod outcome;
pub mod probe;
pub mod process;
pub mod request;
pub mod timeout;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use executor::CommandExecutor;
pub use outcome::{Failure, Outcome};
pub use probe::{ProbeVerdict, judge};
pub use process::ProcessExecutor;
pub use request::{CallKind, ExecutionRequest};
pub use timeout::TimeoutConfig;

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{CallRecord, ScriptedExecutor};
