#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Resilience
//!
//! Retry budgets and exponential backoff with jitter. The orchestrator
//! owns the retry loop; this crate only answers "how many attempts" and
//! "how long to wait".

pub mod backoff;
pub mod error;
pub mod retry;

pub use backoff::{BackoffPolicy, JitterPolicy};
pub use error::ConfigError;
pub use retry::{RetryDecision, RetryPolicy};
