//! Process-wide target locks.

use std::sync::Arc;

use dashmap::DashMap;
use steward_core::TargetLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per target entity, shared by every plan in the process.
///
/// Waiters are served in arrival order.
#[derive(Debug, Default)]
pub struct TargetLocks {
    locks: DashMap<TargetLock, Arc<Mutex<()>>>,
}

/// Held while a step mutates its target; released on drop.
#[derive(Debug)]
pub struct TargetGuard {
    lock: TargetLock,
    _guard: OwnedMutexGuard<()>,
}

impl TargetGuard {
    /// The lock this guard holds.
    pub fn lock(&self) -> &TargetLock {
        &self.lock
    }
}

impl TargetLocks {
    /// No locks yet; entries are created on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `lock`.
    pub async fn acquire(&self, lock: &TargetLock) -> TargetGuard {
        let mutex = Arc::clone(self.locks.entry(lock.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        tracing::trace!(lock = %lock.as_str(), "target lock acquired");
        TargetGuard {
            lock: lock.clone(),
            _guard: guard,
        }
    }

    /// Returns `true` if someone currently holds `lock`.
    pub fn is_held(&self, lock: &TargetLock) -> bool {
        self.locks
            .get(lock)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of distinct locks ever requested.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no lock was ever requested.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
