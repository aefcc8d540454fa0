//! Process-wide master key provider

use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use super::SecretKeyStore;
use crate::crypto::MasterKey;
use crate::error::Result;

/// Binds a key store to the master key alias and caches the key once loaded
///
/// One provider is shared by every encrypted keychain in the process. Once
/// the key has been obtained it is kept for the lifetime of the provider.
pub struct MasterKeyProvider {
    store: Arc<dyn SecretKeyStore>,
    alias: String,
    cached: Mutex<Option<MasterKey>>,
}

impl MasterKeyProvider {
    pub fn new(store: Arc<dyn SecretKeyStore>, alias: impl Into<String>) -> Self {
        Self {
            store,
            alias: alias.into(),
            cached: Mutex::new(None),
        }
    }

    /// Alias of the master key in the key store
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Get the master key, creating it on first use
    ///
    /// Returns `None` when the key store can't provide the key.
    pub fn get_or_create_key(&self) -> Option<MasterKey> {
        let mut cached = match self.cached.lock() {
            Ok(cached) => cached,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(key) = cached.as_ref() {
            return Some(key.clone());
        }

        match self.store.get_or_create_key(&self.alias, true) {
            Some(key) => {
                debug!("Acquired master key '{}' from {}", self.alias, self.store.backend_name());
                *cached = Some(key.clone());
                Some(key)
            }
            None => {
                error!("Unable to acquire master key '{}'", self.alias);
                None
            }
        }
    }

    /// Check if the key exists in the key store
    pub fn contains_key(&self) -> bool {
        self.store.contains_key(&self.alias)
    }

    /// Delete the key from the key store and forget the cached copy
    pub fn delete_key(&self) -> Result<()> {
        let mut cached = match self.cached.lock() {
            Ok(cached) => cached,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cached = None;
        self.store.delete_key(&self.alias)
    }

    /// Check if the key is held in dedicated secure hardware
    pub fn is_inside_secure_hardware(&self) -> bool {
        self.store.is_inside_secure_hardware(&self.alias)
    }
}
