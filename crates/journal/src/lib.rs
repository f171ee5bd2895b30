#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Journal
//!
//! Durable, append-only log of every plan event. The orchestrator writes
//! to the journal before and after each external call; on restart the
//! journal is the only source of truth for what happened.
//!
//! - [`Journal`]: the async port
//! - [`FileJournal`]: one checksummed, line-oriented file per plan
//! - [`MemoryJournal`]: in-memory backend for tests
//!
//! A corrupt or torn tail is cut off on load and reported through
//! [`LoadedPlan::corruption`]; a plan whose first record is unreadable
//! cannot be loaded.

pub mod codec;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{CorruptionReason, JournalCorruption, JournalError};
pub use file::{FileJournal, JOURNAL_EXTENSION};
pub use memory::MemoryJournal;
pub use store::{Journal, LoadedPlan};
