//! Exponential backoff with jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Jitter applied on top of the exponential delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterPolicy {
    /// Use the computed delay exactly.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    #[default]
    Equal,
}

impl JitterPolicy {
    /// Apply jitter to `delay`.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        if millis == 0 {
            return delay;
        }
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(fastrand::u64(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + fastrand::u64(0..=millis - half))
            }
        }
    }
}

/// Exponential backoff: `initial * multiplier^retry`, capped at `max`,
/// then jittered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Jitter policy.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(60),
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// A policy with the given bounds and default multiplier and jitter.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Set the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// No delay at all. Useful in tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
            jitter: JitterPolicy::None,
        }
    }

    /// Check the policy's ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "multiplier",
                format!("must be a finite number >= 1.0, got {}", self.multiplier),
            ));
        }
        if self.max < self.initial {
            return Err(ConfigError::invalid(
                "max",
                format!("{:?} is below initial delay {:?}", self.max, self.initial),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0 = first retry), without jitter.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let nanos = self.initial.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Jittered delay before retry number `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.jitter.apply(self.base_delay(retry))
    }
}
