//! Target kinds and target locks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of external system an operation acts on.
///
/// The kind decides which timeout applies to an execution and how the
/// executor classifies failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// The Kubernetes API server (`kubectl`).
    ClusterApi,
    /// The etcd cluster (`etcdctl`).
    Etcd,
    /// The local host: mounts, packages, services. Requires root.
    Host,
}

impl TargetKind {
    /// Returns `true` for operations that mutate the local host.
    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterApi => write!(f, "cluster_api"),
            Self::Etcd => write!(f, "etcd"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Maximum allowed length for a [`TargetLock`].
const TARGET_LOCK_MAX_LEN: usize = 253;

/// Errors from constructing a [`TargetLock`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetLockError {
    /// The input was empty or contained only whitespace.
    #[error("target lock cannot be empty or whitespace")]
    Empty,
    /// The key contains whitespace or control characters.
    #[error("target lock contains invalid characters")]
    InvalidCharacters,
    /// The key exceeds [`TARGET_LOCK_MAX_LEN`] characters.
    #[error("target lock exceeds maximum length of {TARGET_LOCK_MAX_LEN} characters")]
    TooLong,
}

/// A mutual-exclusion key naming the external entity a step mutates.
///
/// Two steps carrying the same lock never execute at the same time, no
/// matter how independent they are in the plan's dependency graph. Keys are
/// namespaced by entity type (`node/worker-1`, `etcd/member-a`,
/// `mount//var/lib/data`) so a node and an etcd member with the same name do
/// not collide.
///
/// # Examples
///
/// ```
/// use steward_core::TargetLock;
///
/// let lock = TargetLock::node("worker-1").unwrap();
/// assert_eq!(lock.as_str(), "node/worker-1");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetLock(String);

impl TargetLock {
    /// Create a lock from a raw, already namespaced key.
    pub fn new(raw: &str) -> Result<Self, TargetLockError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetLockError::Empty);
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TargetLockError::InvalidCharacters);
        }
        if trimmed.len() > TARGET_LOCK_MAX_LEN {
            return Err(TargetLockError::TooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Lock on a Kubernetes node.
    pub fn node(name: &str) -> Result<Self, TargetLockError> {
        Self::namespaced("node", name)
    }

    /// Lock on an etcd member.
    pub fn etcd_member(member: &str) -> Result<Self, TargetLockError> {
        Self::namespaced("etcd", member)
    }

    /// Lock on a host mount point.
    pub fn mount(path: &str) -> Result<Self, TargetLockError> {
        Self::namespaced("mount", path)
    }

    fn namespaced(namespace: &str, name: &str) -> Result<Self, TargetLockError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TargetLockError::Empty);
        }
        Self::new(&format!("{namespace}/{name}"))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TargetLock {
    type Error = TargetLockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TargetLock> for String {
    fn from(lock: TargetLock) -> Self {
        lock.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", TargetLockError::Empty)]
    #[case("   ", TargetLockError::Empty)]
    #[case("node/a b", TargetLockError::InvalidCharacters)]
    #[case("node/a\tb", TargetLockError::InvalidCharacters)]
    fn rejects_invalid_keys(#[case] raw: &str, #[case] expected: TargetLockError) {
        assert_eq!(TargetLock::new(raw).unwrap_err(), expected);
    }

    #[test]
    fn rejects_overlong_keys() {
        let raw = "x".repeat(TARGET_LOCK_MAX_LEN + 1);
        assert_eq!(TargetLock::new(&raw).unwrap_err(), TargetLockError::TooLong);
    }

    #[test]
    fn namespaces_do_not_collide() {
        let node = TargetLock::node("a").unwrap();
        let member = TargetLock::etcd_member("a").unwrap();
        assert_ne!(node, member);
        assert_eq!(member.as_str(), "etcd/a");
    }

    #[test]
    fn namespaced_rejects_empty_name() {
        assert_eq!(TargetLock::node(" ").unwrap_err(), TargetLockError::Empty);
    }

    #[test]
    fn serde_goes_through_validation() {
        let lock: TargetLock = serde_json::from_str("\"mount//var/lib/data\"").unwrap();
        assert_eq!(lock.as_str(), "mount//var/lib/data");
        assert!(serde_json::from_str::<TargetLock>("\"\"").is_err());
    }

    #[test]
    fn target_kind_display() {
        assert_eq!(TargetKind::ClusterApi.to_string(), "cluster_api");
        assert_eq!(TargetKind::Etcd.to_string(), "etcd");
        assert_eq!(TargetKind::Host.to_string(), "host");
        assert!(TargetKind::Host.is_host());
    }
}
