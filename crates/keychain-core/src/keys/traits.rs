//! Key store trait definitions

use crate::crypto::MasterKey;
use crate::error::Result;

/// Trait for stores that keep symmetric keys outside the keychain content
pub trait SecretKeyStore: Send + Sync {
    /// Load the key stored under `alias`, generating and persisting a new one
    /// when it's missing and `allow_create` is set
    ///
    /// Returns `None` if the key is missing or the store is unavailable.
    fn get_or_create_key(&self, alias: &str, allow_create: bool) -> Option<MasterKey>;

    /// Delete the key stored under `alias`. Missing keys are not an error.
    fn delete_key(&self, alias: &str) -> Result<()>;

    /// Check if a key is stored under `alias`
    fn contains_key(&self, alias: &str) -> bool;

    /// Check if the key material never leaves dedicated secure hardware
    fn is_inside_secure_hardware(&self, alias: &str) -> bool;

    /// Get a human-readable name for this key store
    fn backend_name(&self) -> &'static str;
}
