//! Keyed async mutual exclusion.
//!
//! Every mutation of a contact's conversation, exchanges and record runs
//! inside that contact's section, so concurrent events for one contact are
//! applied one after another while different contacts proceed in parallel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = Mutex<HashMap<K, Arc<AsyncMutex<()>>>>;

/// A registry of async mutexes created on demand, one per key.
///
/// Entries are dropped as soon as no guard or waiter references them.
pub struct KeyedLocks<K> {
    slots: Arc<Slots<K>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let slot = self.slot(&key);
        let guard = slot.lock_owned().await;
        KeyGuard {
            key,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Takes exclusive access to `key` only if nobody holds it.
    pub fn try_lock(&self, key: K) -> Option<KeyGuard<K>> {
        let slot = self.slot(&key);
        match slot.try_lock_owned() {
            Ok(guard) => Some(KeyGuard {
                key,
                slots: Arc::clone(&self.slots),
                guard: Some(guard),
            }),
            Err(_) => {
                release_slot(&self.slots, &key);
                None
            }
        }
    }

    /// Keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key; released on drop.
pub struct KeyGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    slots: Arc<Slots<K>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> KeyGuard<K>
where
    K: Eq + Hash,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.guard.take();
        release_slot(&self.slots, &self.key);
    }
}

/// Removes the slot for `key` when only the registry still references it.
fn release_slot<K: Eq + Hash>(slots: &Slots<K>, key: &K) {
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    if slots
        .get(key)
        .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
        slots.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    let _guard = locks.lock("contact-1").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(1).await;
        assert!(locks.try_lock(2).is_some());
        assert!(locks.try_lock(1).is_none());
    }

    #[tokio::test]
    async fn failed_try_lock_leaves_no_slot_behind() {
        let locks = KeyedLocks::new();
        let held = locks.lock("busy").await;
        assert!(locks.try_lock("busy").is_none());
        assert_eq!(locks.active_keys(), 1);
        drop(held);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn slots_are_released_after_use() {
        let locks = KeyedLocks::new();
        {
            let guard = locks.lock("x").await;
            assert_eq!(guard.key(), &"x");
            assert_eq!(locks.active_keys(), 1);
        }
        assert_eq!(locks.active_keys(), 0);
        assert!(locks.try_lock("x").is_some());
    }
}
