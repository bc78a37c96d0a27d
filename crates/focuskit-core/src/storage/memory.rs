//! In-process store shared between surfaces by cloning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::{KeyValueStore, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    values: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                values: RwLock::new(HashMap::new()),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn publish(&self, key: &str, value: Option<String>) {
        // No receivers is fine.
        let _ = self.inner.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        let values = self
            .inner
            .values
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        {
            let mut values = self
                .inner
                .values
                .write()
                .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
            values.insert(key.to_string(), value.to_string());
        }
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        let removed = {
            let mut values = self
                .inner
                .values
                .write()
                .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
            values.remove(key)
        };
        if removed.is_some() {
            self.publish(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_values_and_changes() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut rx = other.subscribe();

        store.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
        let change = rx.try_recv().unwrap();
        assert_eq!(change.key, "k");
        assert_eq!(change.value.as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert_eq!(rx.try_recv().unwrap().value, None);
    }

    #[test]
    fn offline_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(store.set("k", "v"), Err(StoreError::Unavailable(_))));
        assert!(store.get("k").is_err());
        store.set_offline(false);
        assert!(store.get("k").unwrap().is_none());
    }
}
