//! In-memory key store
//!
//! Keys live only as long as the store. The store can be locked to simulate
//! a key store that refuses access, as happens with a locked device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::SecretKeyStore;
use crate::crypto::MasterKey;
use crate::error::{KeychainError, Result};

/// In-memory implementation of [`SecretKeyStore`]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, MasterKey>>,
    locked: AtomicBool,
    secure_hardware: bool,
    created: AtomicUsize,
}

impl MemoryKeyStore {
    /// Create an unlocked store that reports software-only keys
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            locked: AtomicBool::new(false),
            secure_hardware: false,
            created: AtomicUsize::new(0),
        }
    }

    /// Report keys as held in dedicated secure hardware
    pub fn with_secure_hardware(mut self, secure_hardware: bool) -> Self {
        self.secure_hardware = secure_hardware;
        self
    }

    /// While locked, no key can be loaded or created
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Number of keys generated by this store so far
    pub fn created_keys(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretKeyStore for MemoryKeyStore {
    fn get_or_create_key(&self, alias: &str, allow_create: bool) -> Option<MasterKey> {
        if self.is_locked() {
            debug!("Key store is locked, key '{}' is not available", alias);
            return None;
        }

        let mut keys = self.keys.lock().ok()?;
        if let Some(key) = keys.get(alias) {
            return Some(key.clone());
        }
        if !allow_create {
            return None;
        }

        let key = MasterKey::generate();
        keys.insert(alias.to_string(), key.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(key)
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| KeychainError::KeyStoreError("lock poisoned during delete".to_string()))?;
        keys.remove(alias);
        Ok(())
    }

    fn contains_key(&self, alias: &str) -> bool {
        self.keys
            .lock()
            .map(|keys| keys.contains_key(alias))
            .unwrap_or(false)
    }

    fn is_inside_secure_hardware(&self, _alias: &str) -> bool {
        self.secure_hardware
    }

    fn backend_name(&self) -> &'static str {
        "In-Memory Key Store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_once() {
        let store = MemoryKeyStore::new();

        assert!(store.get_or_create_key("alias", false).is_none());
        assert!(!store.contains_key("alias"));

        let key1 = store.get_or_create_key("alias", true).unwrap();
        let key2 = store.get_or_create_key("alias", true).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(store.created_keys(), 1);
        assert!(store.contains_key("alias"));
    }

    #[test]
    fn test_locked_store() {
        let store = MemoryKeyStore::new();
        store.get_or_create_key("alias", true).unwrap();

        store.set_locked(true);
        assert!(store.get_or_create_key("alias", true).is_none());

        store.set_locked(false);
        assert!(store.get_or_create_key("alias", false).is_some());
    }

    #[test]
    fn test_delete() {
        let store = MemoryKeyStore::new();
        store.get_or_create_key("alias", true).unwrap();
        store.delete_key("alias").unwrap();
        assert!(!store.contains_key("alias"));
        store.delete_key("alias").unwrap();
    }
}
