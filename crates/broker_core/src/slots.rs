//! Per-key mutual exclusion for the in-memory record stores.
//!
//! The outer map lock is held only long enough to find or create a slot;
//! all read-modify-write work happens under the slot's own mutex, so
//! requests against different keys never contend.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A slot value that can tell whether it still holds anything worth keeping.
pub trait Vacant {
    fn is_vacant(&self) -> bool;
}

impl<T> Vacant for Option<T> {
    fn is_vacant(&self) -> bool {
        self.is_none()
    }
}

pub struct KeyedSlots<K, V> {
    slots: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> Default for KeyedSlots<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedSlots<K, V>
where
    K: Eq + Hash + Clone,
    V: Vacant + Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slot for `key`, creating an empty one on first use.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<V> {
        let existing = self.slots.read().await.get(key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => self
                .slots
                .write()
                .await
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(V::default())))
                .clone(),
        };
        slot.lock_owned().await
    }

    /// Drop the slot for `key` if nobody holds it and it is empty.
    ///
    /// Call after releasing a guard whose value may have become vacant.
    pub async fn release(&self, key: &K) {
        let mut slots = self.slots.write().await;
        let removable = match slots.get(key) {
            Some(slot) if Arc::strong_count(slot) == 1 => slot
                .try_lock()
                .map(|value| value.is_vacant())
                .unwrap_or(false),
            _ => false,
        };
        if removable {
            slots.remove(key);
        }
    }

    /// Clones of every occupied value. Slots held elsewhere are waited on,
    /// so busy entries are counted rather than skipped.
    pub async fn snapshot(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        let slots: Vec<(K, Arc<Mutex<V>>)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        let mut occupied = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            let value = slot.lock().await;
            if !value.is_vacant() {
                occupied.push((key, value.clone()));
            }
        }
        occupied
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn release_removes_only_vacant_slots() {
        let slots: KeyedSlots<String, Option<u32>> = KeyedSlots::new();
        let key = "a".to_string();

        {
            let mut guard = slots.lock(&key).await;
            *guard = Some(1);
        }
        slots.release(&key).await;
        assert_eq!(slots.len().await, 1);

        {
            let mut guard = slots.lock(&key).await;
            *guard = None;
        }
        slots.release(&key).await;
        assert!(slots.is_empty().await);
    }

    #[tokio::test]
    async fn held_slot_is_not_released() {
        let slots: KeyedSlots<String, Option<u32>> = KeyedSlots::new();
        let key = "a".to_string();
        let guard = slots.lock(&key).await;
        slots.release(&key).await;
        assert_eq!(slots.len().await, 1);
        drop(guard);
        slots.release(&key).await;
        assert!(slots.is_empty().await);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let slots: Arc<KeyedSlots<String, Option<u32>>> = Arc::new(KeyedSlots::new());
        let _held = slots.lock(&"a".to_string()).await;

        let other = slots.clone();
        let result = tokio::time::timeout(Duration::from_millis(200), async move {
            let mut guard = other.lock(&"b".to_string()).await;
            *guard = Some(2);
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn snapshot_lists_occupied_slots() {
        let slots: KeyedSlots<String, Option<u32>> = KeyedSlots::new();
        *slots.lock(&"a".to_string()).await = Some(1);
        let _ = slots.lock(&"b".to_string()).await;
        let snapshot = slots.snapshot().await;
        assert_eq!(snapshot, vec![("a".to_string(), Some(1))]);
    }

    #[tokio::test]
    async fn snapshot_counts_slots_held_by_others() {
        let slots: Arc<KeyedSlots<String, Option<u32>>> = Arc::new(KeyedSlots::new());
        let mut guard = slots.lock(&"a".to_string()).await;
        *guard = Some(1);

        let reader = tokio::spawn({
            let slots = slots.clone();
            async move { slots.snapshot().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());
        drop(guard);

        let snapshot = reader.await.unwrap();
        assert_eq!(snapshot, vec![("a".to_string(), Some(1))]);
    }
}
