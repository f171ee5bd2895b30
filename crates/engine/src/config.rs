//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use steward_plan::Operation;
use steward_resilience::{ConfigError, RetryPolicy};
use steward_runtime::TimeoutConfig;

/// Knobs of the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Step attempts in flight at once, across all plans of the process.
    pub max_concurrency: usize,
    /// Attempt budgets and backoff.
    pub retry: RetryPolicy,
    /// Call deadlines per target kind.
    pub timeouts: TimeoutConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Override the worker count.
    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the call deadlines.
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        self.retry.validate()
    }

    /// Attempt budget of `operation`.
    ///
    /// A non-idempotent host operation without a reconciliation check never
    /// gets more attempts than it declares (one by default), whatever the
    /// configuration says.
    pub fn attempt_budget(&self, operation: &Operation) -> u32 {
        let budget = self
            .retry
            .attempts_for(operation.name(), operation.attempt_limit());
        let unverifiable = !operation.is_idempotent() && operation.reconcile().is_none();
        if unverifiable && operation.kind().is_host() {
            budget.min(operation.attempt_limit().unwrap_or(1))
        } else {
            budget
        }
    }
}
