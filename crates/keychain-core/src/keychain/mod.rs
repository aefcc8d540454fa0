//! Keychain contract and its two backends
//!
//! A keychain is a namespace of small typed values (byte arrays, strings,
//! string sets, booleans, longs, floats) addressed by string keys.
//!
//! - [`EncryptedKeychain`] seals every value with the shared master key.
//! - [`PlainKeychain`] stores values as-is, for platforms without a usable
//!   key store.
//!
//! Missing, malformed, or undecryptable entries read as absent. Asking for a
//! value with an accessor of a different type, or touching a reserved key, is
//! an error.

mod encrypted;
mod plain;

pub use encrypted::{EncryptedKeychain, KEYCHAIN_V1};
pub use plain::PlainKeychain;

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{KeychainError, Result};

/// Reserved key holding the encrypted content version
pub const VERSION_KEY: &str = "secure-keychain.version";

/// Keys used for internal bookkeeping, never accessible through accessors
pub const RESERVED_KEYS: &[&str] = &[VERSION_KEY];

/// Check whether `key` is reserved for internal use
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

pub(crate) fn fail_on_reserved_key(key: &str) -> Result<()> {
    if is_reserved_key(key) {
        return Err(KeychainError::ReservedKey(key.to_string()));
    }
    Ok(())
}

// The namespace locks guard no data of their own, so a poisoned lock is
// still safe to take.
pub(crate) fn read_lock(lock: &RwLock<()>) -> RwLockReadGuard<'_, ()> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write_lock(lock: &RwLock<()>) -> RwLockWriteGuard<'_, ()> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Typed key-value storage scoped to one namespace
pub trait Keychain: Send + Sync {
    /// Namespace identifier
    fn identifier(&self) -> &str;

    /// Whether values are sealed with the master key
    fn is_encrypted(&self) -> bool;

    /// Whether the master key lives in a dedicated secure element
    fn is_strongbox_backed(&self) -> bool;

    /// Whether `key` is reserved and therefore rejected by every accessor
    fn is_reserved_key(&self, key: &str) -> bool {
        is_reserved_key(key)
    }

    /// Check if a readable value is stored for `key`
    fn contains(&self, key: &str) -> Result<bool>;

    /// Remove the value stored for `key`
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every value in the namespace
    fn remove_all(&self) -> Result<()>;

    // Byte array accessors

    /// Empty byte arrays read as `None`
    fn get_data(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `None` or an empty slice removes the entry
    fn put_data(&self, key: &str, data: Option<&[u8]>) -> Result<()>;

    // String accessors

    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn get_string_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_string(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// `None` removes the entry
    fn put_string(&self, key: &str, value: Option<&str>) -> Result<()>;

    // String set accessors

    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>>;

    /// `None` removes the entry
    fn put_string_set(&self, key: &str, value: Option<&BTreeSet<String>>) -> Result<()>;

    // Boolean accessors

    fn get_bool(&self, key: &str, default: bool) -> Result<bool>;

    fn put_bool(&self, key: &str, value: bool) -> Result<()>;

    // Long accessors

    fn get_long(&self, key: &str, default: i64) -> Result<i64>;

    fn put_long(&self, key: &str, value: i64) -> Result<()>;

    // Float accessors

    fn get_float(&self, key: &str, default: f32) -> Result<f32>;

    fn put_float(&self, key: &str, value: f32) -> Result<()>;
}
