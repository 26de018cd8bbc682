use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use common::{ItemId, OrderId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held while a keyed record is being read and written.
pub type KeyLockGuard = OwnedMutexGuard<()>;

/// Guard held while an item's stock is being read and written.
pub type ItemLockGuard = KeyLockGuard;

/// Serializes stock check, validate and write per item.
pub type ItemLocks = KeyedLocks<ItemId>;

/// Serializes order edits, deletes and replication per order.
pub type OrderLocks = KeyedLocks<OrderId>;

/// One async lock per key, created on first use.
///
/// Holding a key's lock serializes work on that key across every task
/// sharing this table. Different keys never contend. Clones share the
/// same lock table.
pub struct KeyedLocks<K> {
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: K) -> KeyLockGuard {
        let lock = {
            // The table is only touched for the lookup, so a poisoned map is
            // still consistent.
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys that have been locked at least once.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
