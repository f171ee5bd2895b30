//! On-disk record format.
//!
//! One record per line: `<sha256 of json, lowercase hex> <json>\n`. The
//! checksum catches torn and bit-flipped writes; the newline terminates a
//! record, so a record without one was never fully written.

use sha2::{Digest, Sha256};
use steward_core::PlanId;
use steward_execution::JournalEntry;

use crate::error::{CorruptionReason, JournalCorruption, JournalError};

/// Length of a hex-encoded SHA-256 digest.
const CHECKSUM_LEN: usize = 64;

/// Hex SHA-256 of `payload`.
pub fn checksum(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize().as_slice())
}

/// Encode one entry as a complete record line, newline included.
pub fn encode(entry: &JournalEntry) -> Result<String, JournalError> {
    let json = entry.to_json()?;
    Ok(format!("{} {json}\n", checksum(&json)))
}

/// Decode one record line (without its newline).
pub fn decode(line: &[u8]) -> Result<JournalEntry, CorruptionReason> {
    let line = std::str::from_utf8(line).map_err(|e| CorruptionReason::Malformed {
        detail: e.to_string(),
    })?;
    let Some((sum, json)) = line.split_once(' ') else {
        return Err(CorruptionReason::Malformed {
            detail: "missing checksum separator".into(),
        });
    };
    if sum.len() != CHECKSUM_LEN {
        return Err(CorruptionReason::Malformed {
            detail: format!("checksum has {} characters", sum.len()),
        });
    }
    if checksum(json) != sum {
        return Err(CorruptionReason::ChecksumMismatch);
    }
    JournalEntry::from_json(json).map_err(|e| CorruptionReason::Malformed {
        detail: e.to_string(),
    })
}

/// Result of scanning a journal file.
#[derive(Debug)]
pub struct Scan {
    /// Entries decoded before the first bad record.
    pub entries: Vec<JournalEntry>,
    /// The corrupt tail, if any.
    pub corruption: Option<JournalCorruption>,
}

/// Decode `bytes` record by record, stopping at the first bad one.
pub fn scan(plan_id: PlanId, bytes: &[u8]) -> Scan {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let total = bytes.len() as u64;

    while offset < bytes.len() {
        let line = entries.len() + 1;
        let rest = &bytes[offset..];
        let decoded = match rest.iter().position(|b| *b == b'\n') {
            Some(end) => decode(&rest[..end]).map(|entry| (entry, end + 1)),
            None => Err(CorruptionReason::MissingNewline),
        };
        match decoded {
            Ok((entry, consumed)) => {
                entries.push(entry);
                offset += consumed;
            }
            Err(reason) => {
                let start = offset as u64;
                return Scan {
                    entries,
                    corruption: Some(JournalCorruption {
                        plan_id,
                        line,
                        offset: start,
                        discarded_bytes: total - start,
                        reason,
                    }),
                };
            }
        }
    }

    Scan {
        entries,
        corruption: None,
    }
}
