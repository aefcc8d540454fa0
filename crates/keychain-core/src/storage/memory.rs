//! In-memory durable store
//!
//! Content lives for as long as the store object does. Useful for tests and
//! for processes that must not touch the disk.
//!
//! # Thread Safety
//!
//! Entries are guarded by an `RwLock`. Lock poisoning is reported as a
//! `StorageError` rather than a panic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use super::{DurableStore, StoreBatch, StoreProvider, StoredValue};
use crate::error::{KeychainError, Result};

fn lock_error(context: &str) -> KeychainError {
    KeychainError::StorageError(format!("MemoryStore: lock poisoned during {}", context))
}

/// In-memory implementation of [`DurableStore`]
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with entries
    pub fn with_entries(entries: BTreeMap<String, StoredValue>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of stored entries. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if the lock is poisoned.
    pub fn is_empty(&self) -> bool {
        self.entries.read().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let entries = self.entries.read().map_err(|_| lock_error("get"))?;
        Ok(entries.get(key).cloned())
    }

    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>> {
        let entries = self.entries.read().map_err(|_| lock_error("get_all"))?;
        Ok(entries.clone())
    }

    fn apply(&self, batch: StoreBatch) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| lock_error("apply"))?;
        batch.apply_to(&mut entries);
        Ok(())
    }
}

/// Hands out one shared [`MemoryStore`] per namespace identifier
#[derive(Default)]
pub struct MemoryStoreProvider {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store for an identifier, created on first use
    pub fn store(&self, identifier: &str) -> Result<Arc<MemoryStore>> {
        let mut stores = self.stores.lock().map_err(|_| lock_error("open"))?;
        let store = stores
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()));
        Ok(store.clone())
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, identifier: &str) -> Result<Arc<dyn DurableStore>> {
        let store: Arc<dyn DurableStore> = self.store(identifier)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let store = MemoryStore::new();

        store.put("key", StoredValue::Text("value".to_string())).unwrap();
        assert_eq!(
            store.get("key").unwrap(),
            Some(StoredValue::Text("value".to_string()))
        );
        assert!(store.contains("key").unwrap());

        store.remove("key").unwrap();
        assert_eq!(store.get("key").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = MemoryStore::new();
        store.put("a", StoredValue::Long(1)).unwrap();
        store.put("b", StoredValue::Boolean(false)).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_with_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), StoredValue::Long(1));
        entries.insert("b".to_string(), StoredValue::Text("two".to_string()));
        let store = MemoryStore::with_entries(entries.clone());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_all().unwrap(), entries);
    }

    #[test]
    fn test_provider_returns_same_store() {
        let provider = MemoryStoreProvider::new();

        provider.open("ns").unwrap().put("k", StoredValue::Int(3)).unwrap();

        assert_eq!(provider.open("ns").unwrap().get("k").unwrap(), Some(StoredValue::Int(3)));
        assert_eq!(provider.open("other").unwrap().get("k").unwrap(), None);
        assert_eq!(provider.store("ns").unwrap().len(), 1);
    }
}
