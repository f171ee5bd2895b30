//! Durable per-attempt execution records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_core::StepId;

use crate::idempotency::IdempotencyKey;

/// Longest stdout/stderr excerpt kept in a record, in bytes.
pub const OUTPUT_SNAPSHOT_LIMIT: usize = 4096;

/// Why an attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// The step's own action.
    Action,
    /// The compensating operation, during rollback.
    Compensation,
    /// The reconciliation check after an ambiguous outcome.
    Reconciliation,
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Compensation => write!(f, "compensation"),
            Self::Reconciliation => write!(f, "reconciliation"),
        }
    }
}

/// Classified cause of a failed external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The call exceeded its timeout; its effect is unknown.
    Timeout,
    /// Connection refused, reset, DNS or TLS handshake trouble.
    Network,
    /// Optimistic-concurrency conflict or "try again" from the API server.
    Conflict,
    /// etcd lost its leader or quorum.
    EtcdUnavailable,
    /// A device or mount point is busy.
    DeviceBusy,
    /// A precondition probe did not hold.
    PreconditionUnmet,
    /// Authentication or authorisation was refused.
    Forbidden,
    /// The request itself was rejected as invalid.
    InvalidInput,
    /// The target object does not exist.
    NotFound,
    /// The program could not be started.
    Spawn,
    /// Anything not recognised.
    Unknown,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Conflict => "conflict",
            Self::EtcdUnavailable => "etcd_unavailable",
            Self::DeviceBusy => "device_busy",
            Self::PreconditionUnmet => "precondition_unmet",
            Self::Forbidden => "forbidden",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Spawn => "spawn",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A bounded excerpt of what a command printed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    /// Exit code, if the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Start of stdout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Start of stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl OutputSnapshot {
    /// Snapshot `stdout`/`stderr`, truncating each to [`OUTPUT_SNAPSHOT_LIMIT`].
    #[must_use]
    pub fn capture(exit_code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: truncate(stdout),
            stderr: truncate(stderr),
        }
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= OUTPUT_SNAPSHOT_LIMIT {
        return text.to_owned();
    }
    let mut end = OUTPUT_SNAPSHOT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// How a finished attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The action or compensation took effect.
    Succeeded {
        /// What the command printed.
        output: OutputSnapshot,
    },
    /// The call failed.
    Failed {
        /// Whether a retry may succeed.
        retryable: bool,
        /// Classified cause.
        category: FailureCategory,
        /// Human-readable detail.
        message: String,
        /// What the command printed, if it ran.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<OutputSnapshot>,
    },
    /// The call may or may not have taken effect.
    Ambiguous {
        /// Classified cause.
        category: FailureCategory,
        /// Human-readable detail.
        message: String,
    },
    /// The reconciliation check found the effect in place.
    Applied,
    /// The reconciliation check found no effect.
    NotApplied,
    /// The process stopped while the attempt was open.
    Interrupted,
}

impl AttemptOutcome {
    /// Returns `true` for a successful action or compensation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Short label for logs and reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed {
                retryable: true, ..
            } => "retryable",
            Self::Failed { .. } => "fatal",
            Self::Ambiguous { .. } => "ambiguous",
            Self::Applied => "applied",
            Self::NotApplied => "not_applied",
            Self::Interrupted => "interrupted",
        }
    }

    /// Failure detail, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } | Self::Ambiguous { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// One attempt at one step.
///
/// Journaled twice: open (no `finished_at`, no outcome) before the external
/// call, closed once the call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Step identity.
    pub step: StepId,
    /// Operation executed (the compensation's name for compensations).
    pub operation: String,
    /// Why the attempt was made.
    pub kind: AttemptKind,
    /// 1-based attempt number within `(step, kind)`.
    pub attempt: u32,
    /// Key identifying this attempt.
    pub idempotency_key: IdempotencyKey,
    /// Rendered command line, for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When it finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// How it finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AttemptOutcome>,
}

impl ExecutionRecord {
    /// An open record for a new attempt, starting now.
    #[must_use]
    pub fn open(step: StepId, operation: impl Into<String>, kind: AttemptKind, attempt: u32) -> Self {
        Self {
            step,
            operation: operation.into(),
            kind,
            attempt,
            idempotency_key: IdempotencyKey::generate(step, kind, attempt),
            command: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
        }
    }

    /// Attach the rendered command line.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// The closed form of this record, finishing now.
    #[must_use]
    pub fn close(&self, outcome: AttemptOutcome) -> Self {
        let mut closed = self.clone();
        closed.finished_at = Some(Utc::now().max(self.started_at));
        closed.outcome = Some(outcome);
        closed
    }

    /// Returns `true` while the attempt has no outcome.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }

    /// Wall-clock duration, once closed.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .map(|end| (end - self.started_at).to_std().unwrap_or(Duration::ZERO))
    }
}
