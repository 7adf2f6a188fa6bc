// Overlay store: original path -> working copy, plus per-path serialization.
//
// The map lock only guards map access and is never held across I/O.
// Read-modify-write sequences on one path hold that path's `PathLocks` guard
// instead, so different paths never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::working_copy::WorkingCopy;

/// Lock entries are pruned once the table grows past this many paths.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Default)]
pub struct OverlayStore {
    copies: RwLock<HashMap<String, WorkingCopy>>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the working copy tracked for `path`.
    pub fn get(&self, path: &str) -> Option<WorkingCopy> {
        self.copies.read().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    pub fn put(&self, path: impl Into<String>, copy: WorkingCopy) {
        self.copies.write().unwrap_or_else(PoisonError::into_inner).insert(path.into(), copy);
    }

    pub fn remove(&self, path: &str) -> Option<WorkingCopy> {
        self.copies.write().unwrap_or_else(PoisonError::into_inner).remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.copies.read().unwrap_or_else(PoisonError::into_inner).contains_key(path)
    }

    /// Tracked original paths, sorted.
    pub fn tracked_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> =
            self.copies.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.copies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while an operation owns a path.
pub type PathGuard = OwnedMutexGuard<()>;

/// One FIFO async mutex per original path.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str) -> PathGuard {
        self.entry(path).lock_owned().await
    }

    /// Lock two paths in lexical order. Equal paths take a single guard.
    pub async fn lock_pair(&self, a: &str, b: &str) -> (PathGuard, Option<PathGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.lock(first).await;
        let second_guard = self.lock(second).await;
        (first_guard, Some(second_guard))
    }

    fn entry(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() >= PRUNE_THRESHOLD {
            // Only the table holds an idle entry; waiters and holders keep their own Arc.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(path.to_string()).or_default())
    }

    #[cfg(test)]
    fn table_len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
