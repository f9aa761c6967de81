//! Per-session write locks.
//!
//! Locks are handed out as `Arc`s and the registry only keeps `Weak`s, so
//! a session nobody is writing to costs one dead map entry until the next
//! prune.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use loom_core::ids::SessionId;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Dead entries are swept once the map grows past this.
const PRUNE_THRESHOLD: usize = 128;

/// Registry of per-session async mutexes.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Weak<AsyncMutex<()>>>>,
}

impl SessionLocks {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, session_id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();

        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(session_id).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        let _ = locks.insert(session_id.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive write access to a session.
    pub async fn lock(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        self.acquire(session_id).lock_owned().await
    }

    /// Try to take the lock without waiting.
    pub fn try_lock(&self, session_id: &SessionId) -> Option<OwnedMutexGuard<()>> {
        self.acquire(session_id).try_lock_owned().ok()
    }

    /// Forget a session's entry. Holders keep their guard.
    pub fn remove(&self, session_id: &SessionId) {
        let _ = self.locks.lock().remove(session_id);
    }

    /// Entries currently tracked, live or dead.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no entry is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
