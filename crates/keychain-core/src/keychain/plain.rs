//! Plain keychain backend
//!
//! Values are stored in their native store kinds. Byte arrays are persisted
//! as Base64 text. Used when the platform has no trusted key store or
//! encryption is disabled.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::warn;

use super::{fail_on_reserved_key, read_lock, write_lock, Keychain};
use crate::encoding::ValueType;
use crate::error::{KeychainError, Result};
use crate::storage::{DurableStore, StoredValue};

/// Keychain storing values without encryption
pub struct PlainKeychain {
    identifier: String,
    store: Arc<dyn DurableStore>,
    lock: RwLock<()>,
}

impl PlainKeychain {
    pub fn new(identifier: impl Into<String>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            identifier: identifier.into(),
            store,
            lock: RwLock::new(()),
        }
    }

    fn get_value(&self, key: &str) -> Result<Option<StoredValue>> {
        fail_on_reserved_key(key)?;
        let _guard = read_lock(&self.lock);
        self.store.get(key)
    }

    fn set_value(&self, key: &str, value: Option<StoredValue>) -> Result<()> {
        fail_on_reserved_key(key)?;
        let _guard = write_lock(&self.lock);
        match value {
            Some(value) => self.store.put(key, value),
            None => self.store.remove(key),
        }
    }
}

fn mismatch(expected: ValueType, found: &StoredValue) -> KeychainError {
    KeychainError::TypeMismatch {
        expected,
        found: found.kind().to_string(),
    }
}

impl Keychain for PlainKeychain {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn is_strongbox_backed(&self) -> bool {
        false
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_value(key)?.is_some())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.set_value(key, None)
    }

    fn remove_all(&self) -> Result<()> {
        let _guard = write_lock(&self.lock);
        self.store.clear()
    }

    fn get_data(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(StoredValue::Text(serialized)) => match STANDARD.decode(serialized.trim()) {
                Ok(data) if data.is_empty() => Ok(None),
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    warn!("PlainKeychain: {}: Malformed data for key '{}': {}", self.identifier, key, e);
                    Ok(None)
                }
            },
            Some(other) => Err(mismatch(ValueType::Bytes, &other)),
        }
    }

    fn put_data(&self, key: &str, data: Option<&[u8]>) -> Result<()> {
        let value = data
            .filter(|data| !data.is_empty())
            .map(|data| StoredValue::Text(STANDARD.encode(data)));
        self.set_value(key, value)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(StoredValue::Text(string)) => Ok(Some(string)),
            Some(other) => Err(mismatch(ValueType::String, &other)),
        }
    }

    fn put_string(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.set_value(key, value.map(|s| StoredValue::Text(s.to_string())))
    }

    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(StoredValue::StringSet(set)) => Ok(Some(set)),
            Some(other) => Err(mismatch(ValueType::StringSet, &other)),
        }
    }

    fn put_string_set(&self, key: &str, value: Option<&BTreeSet<String>>) -> Result<()> {
        self.set_value(key, value.map(|set| StoredValue::StringSet(set.clone())))
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_value(key)? {
            None => Ok(default),
            Some(StoredValue::Boolean(value)) => Ok(value),
            Some(other) => Err(mismatch(ValueType::Boolean, &other)),
        }
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, Some(StoredValue::Boolean(value)))
    }

    fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_value(key)? {
            None => Ok(default),
            Some(StoredValue::Long(value)) => Ok(value),
            Some(other) => Err(mismatch(ValueType::Long, &other)),
        }
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, Some(StoredValue::Long(value)))
    }

    fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        match self.get_value(key)? {
            None => Ok(default),
            Some(StoredValue::Float(value)) => Ok(value),
            Some(other) => Err(mismatch(ValueType::Float, &other)),
        }
    }

    fn put_float(&self, key: &str, value: f32) -> Result<()> {
        self.set_value(key, Some(StoredValue::Float(value)))
    }
}
