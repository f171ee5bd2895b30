//! Attempt budgets and retry decisions.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;

/// How many times an operation may be attempted, and how long to wait
/// between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts for operations that declare no limit of their own.
    pub max_attempts: u32,
    /// Per-operation attempt limits, by operation name. These win over
    /// both the default and the operation's declared limit.
    pub overrides: BTreeMap<String, u32>,
    /// Delay between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            overrides: BTreeMap::new(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    RetryAfter(Duration),
    /// The attempt budget is spent.
    Exhausted,
}

impl RetryPolicy {
    /// A policy with `max_attempts` and the given backoff.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            overrides: BTreeMap::new(),
            backoff,
        }
    }

    /// Override the limit for one operation.
    pub fn with_override(mut self, operation: impl Into<String>, attempts: u32) -> Self {
        self.overrides.insert(operation.into(), attempts);
        self
    }

    /// Check every limit and the backoff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if let Some((name, _)) = self.overrides.iter().find(|(_, n)| **n == 0) {
            return Err(ConfigError::invalid(
                "overrides",
                format!("operation `{name}` must allow at least 1 attempt"),
            ));
        }
        self.backoff.validate()
    }

    /// Attempt budget for `operation`: configured override, else the
    /// operation's own limit, else the default.
    #[must_use]
    pub fn attempts_for(&self, operation: &str, declared: Option<u32>) -> u32 {
        self.overrides
            .get(operation)
            .copied()
            .or(declared)
            .unwrap_or(self.max_attempts)
            .max(1)
    }

    /// Decide after attempt number `attempt` (1-based) failed retryably.
    #[must_use]
    pub fn decide(&self, attempt: u32, budget: u32) -> RetryDecision {
        if attempt >= budget {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.backoff.delay(attempt.saturating_sub(1)))
        }
    }
}
