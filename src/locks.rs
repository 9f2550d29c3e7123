// Per-entity async locks created on demand
// An entry lives only while some task holds or waits on it

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::storage::StorageError;

pub struct KeyedLocks<L> {
    entries: Mutex<HashMap<Uuid, Arc<L>>>,
}

impl<L: Default> KeyedLocks<L> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Arc<L>>>, StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))
    }

    /// Shared handle to the lock of `key`, created when missing
    pub fn handle(&self, key: Uuid) -> Result<Arc<L>, StorageError> {
        let mut entries = self.entries()?;
        Ok(entries.entry(key).or_default().clone())
    }

    /// Tie an acquired guard to its entry so the entry is pruned on release
    pub fn hold<G>(&self, key: Uuid, guard: G) -> KeyedGuard<'_, L, G> {
        KeyedGuard {
            guard: Some(guard),
            locks: self,
            key,
        }
    }

    fn prune(&self, key: Uuid) {
        if let Ok(mut entries) = self.entries()
            && entries.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: Default> Default for KeyedLocks<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned guard of one keyed lock
pub struct KeyedGuard<'a, L: Default, G> {
    guard: Option<G>,
    locks: &'a KeyedLocks<L>,
    key: Uuid,
}

impl<L: Default, G> Drop for KeyedGuard<'_, L, G> {
    fn drop(&mut self) {
        // Release first so the guard's handle no longer counts
        self.guard.take();
        self.locks.prune(self.key);
    }
}
