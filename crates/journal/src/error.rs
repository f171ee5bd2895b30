//! Error types for journal operations.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use steward_core::PlanId;

/// What made a journal record unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorruptionReason {
    /// The checksum prefix does not match the payload.
    ChecksumMismatch,
    /// The line is not `<checksum> <json>` or the JSON is not an entry.
    Malformed {
        /// Parser message.
        detail: String,
    },
    /// The last record has no trailing newline (torn write).
    MissingNewline,
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::Malformed { detail } => write!(f, "malformed record: {detail}"),
            Self::MissingNewline => write!(f, "incomplete record (no trailing newline)"),
        }
    }
}

/// A corrupt tail found while loading a plan's journal.
///
/// Everything from `offset` on was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalCorruption {
    /// Plan whose journal is affected.
    pub plan_id: PlanId,
    /// 1-based line number of the first bad record.
    pub line: usize,
    /// Byte offset where the bad record starts.
    pub offset: u64,
    /// Bytes dropped from the end of the journal.
    pub discarded_bytes: u64,
    /// Why the record was rejected.
    pub reason: CorruptionReason,
}

impl fmt::Display for JournalCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "journal of plan {} corrupt at line {} (byte {}): {}; {} bytes discarded",
            self.plan_id, self.line, self.offset, self.reason, self.discarded_bytes
        )
    }
}

/// Error type for all journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// No journal exists for the plan.
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),

    /// A journal already exists for the plan.
    #[error("plan already exists: {0}")]
    PlanExists(PlanId),

    /// The journal cannot be used at all (its first record is bad).
    #[error("{0}")]
    Corruption(JournalCorruption),

    /// The journal belongs to another plan.
    #[error("journal of plan {expected} holds plan {found}")]
    PlanMismatch {
        /// Plan that was requested.
        expected: PlanId,
        /// Plan found in the first record.
        found: PlanId,
    },

    /// The first record is not a plan definition.
    #[error("journal of plan {0} does not start with a plan definition")]
    MissingDefinition(PlanId),

    /// Filesystem failure.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An entry could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JournalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
