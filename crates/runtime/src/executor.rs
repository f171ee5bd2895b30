//! The executor port.

use async_trait::async_trait;

use crate::outcome::Outcome;
use crate::request::ExecutionRequest;

/// Runs exactly one external call and classifies the result.
///
/// Implementations never retry and never panic on a failing command: every
/// failure, including one to start the process, comes back as an
/// [`Outcome`]. The call must finish within `request.timeout`; a call that
/// does not is reported as a retryable timeout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the request.
    async fn execute(&self, request: &ExecutionRequest) -> Outcome;
}
