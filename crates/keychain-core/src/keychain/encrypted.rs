//! Encrypted keychain backend
//!
//! Every value is encoded with its type tag, sealed with AES-GCM under the
//! process-wide master key, and stored as Base64 text. The namespace
//! identifier is bound to each value as associated data, so a value copied
//! into another namespace no longer opens.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::{fail_on_reserved_key, is_reserved_key, read_lock, write_lock, Keychain, VERSION_KEY};
use crate::crypto::{open, seal, MasterKey, NONCE_LEN, TAG_LEN};
use crate::encoding::{self, TypedValue};
use crate::error::{KeychainError, Result};
use crate::keys::MasterKeyProvider;
use crate::settings::DEFAULT_MAX_VALUE_SIZE;
use crate::storage::{DurableStore, StoreBatch, StoredValue};

/// Version of the encrypted content layout
pub const KEYCHAIN_V1: i32 = 1;

const SELF_TEST_IDENTIFIER: &str = "secure-keychain.self-test";
const SELF_TEST_PAYLOAD: &[u8] = b"secure-keychain self-test payload";

/// Column width of wrapped Base64 written by older plain keychains
const BASE64_LINE_WIDTH: usize = 76;

/// Keychain sealing values with the shared master key
pub struct EncryptedKeychain {
    identifier: String,
    store: Arc<dyn DurableStore>,
    key_provider: Arc<MasterKeyProvider>,
    strongbox_backed: bool,
    max_value_size: usize,
    lock: RwLock<()>,
}

/// How a plain entry is carried over into the encrypted layout
#[derive(Debug, PartialEq)]
enum LegacyEntry {
    Migrate(TypedValue),
    Drop(&'static str),
}

impl EncryptedKeychain {
    pub fn new(
        identifier: impl Into<String>,
        store: Arc<dyn DurableStore>,
        key_provider: Arc<MasterKeyProvider>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            store,
            key_provider,
            strongbox_backed: false,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            lock: RwLock::new(()),
        }
    }

    pub fn with_strongbox_backed(mut self, strongbox_backed: bool) -> Self {
        self.strongbox_backed = strongbox_backed;
        self
    }

    /// Limit on the encoded size of a single value
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    /// Check whether the store carries the encrypted content marker
    pub fn is_encrypted_content_present(store: &dyn DurableStore) -> Result<bool> {
        Ok(matches!(
            store.get(VERSION_KEY)?,
            Some(StoredValue::Int(version)) if version >= KEYCHAIN_V1
        ))
    }

    /// Seal and open known payloads to prove the master key is usable
    pub fn verify_keystore_encryption(key_provider: &MasterKeyProvider) -> bool {
        let Some(key) = key_provider.get_or_create_key() else {
            error!("Keystore self-test failed: master key is not available");
            return false;
        };

        for payload in [&b""[..], SELF_TEST_PAYLOAD] {
            let opened = seal(payload, &key, SELF_TEST_IDENTIFIER)
                .and_then(|sealed| open(&sealed, &key, SELF_TEST_IDENTIFIER));
            match opened {
                Ok(opened) if opened == payload => {}
                Ok(_) => {
                    error!("Keystore self-test failed: payload mismatch");
                    return false;
                }
                Err(e) => {
                    error!("Keystore self-test failed: {}", e);
                    return false;
                }
            }
        }
        debug!("Keystore self-test succeeded");
        true
    }

    /// Re-encode every entry of a plain store into this keychain
    ///
    /// Either every entry is sealed and committed together with the version
    /// marker, or nothing is written at all. Empty strings and kinds that
    /// have no typed counterpart are dropped. Returns `false` when the
    /// migration was aborted.
    pub fn import_from_legacy_keychain(&self, legacy: &dyn DurableStore) -> bool {
        let _guard = write_lock(&self.lock);
        match self.try_import(legacy) {
            Ok(true) => {
                info!("EncryptedKeychain: {}: Legacy content migrated", self.identifier);
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!("EncryptedKeychain: {}: Legacy migration failed: {}", self.identifier, e);
                false
            }
        }
    }

    fn try_import(&self, legacy: &dyn DurableStore) -> Result<bool> {
        let Some(key) = self.master_key() else {
            return Ok(false);
        };

        let mut batch = StoreBatch::new();
        let mut migrated = 0usize;
        for (name, value) in legacy.get_all()? {
            if is_reserved_key(&name) {
                continue;
            }
            match classify_legacy_entry(&value) {
                LegacyEntry::Migrate(typed) => {
                    let sealed = typed
                        .encode()
                        .map(Zeroizing::new)
                        .and_then(|encoded| self.seal_value(&encoded, &key));
                    match sealed {
                        Ok(sealed) => {
                            batch.put(name, StoredValue::Text(sealed));
                            migrated += 1;
                        }
                        Err(e) => {
                            error!(
                                "EncryptedKeychain: {}: Unable to migrate '{}', aborting: {}",
                                self.identifier, name, e
                            );
                            return Ok(false);
                        }
                    }
                }
                LegacyEntry::Drop(reason) => {
                    warn!("EncryptedKeychain: {}: Dropping '{}': {}", self.identifier, name, reason);
                    batch.remove(name);
                }
            }
        }
        batch.put(VERSION_KEY, StoredValue::Int(KEYCHAIN_V1));

        self.store.apply(batch)?;
        debug!("EncryptedKeychain: {}: Migrated {} entries", self.identifier, migrated);
        Ok(true)
    }

    fn master_key(&self) -> Option<MasterKey> {
        let key = self.key_provider.get_or_create_key();
        if key.is_none() {
            error!("EncryptedKeychain: {}: Master key is not available", self.identifier);
        }
        key
    }

    fn seal_value(&self, encoded: &[u8], key: &MasterKey) -> Result<String> {
        if encoded.len() > self.max_value_size {
            return Err(KeychainError::ValueTooLarge {
                len: encoded.len(),
                max: self.max_value_size,
            });
        }
        let sealed = seal(encoded, key, &self.identifier)?;
        Ok(STANDARD.encode(sealed))
    }

    /// Read and open the raw encoded value, `None` for anything unreadable
    fn get_raw_value(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let serialized = match self.store.get(key)? {
            None => return Ok(None),
            Some(StoredValue::Text(serialized)) => serialized,
            Some(other) => {
                warn!(
                    "EncryptedKeychain: {}: Unexpected {} entry for key '{}'",
                    self.identifier,
                    other.kind(),
                    key
                );
                return Ok(None);
            }
        };

        let sealed = match STANDARD.decode(serialized.trim()) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("EncryptedKeychain: {}: Malformed entry for key '{}': {}", self.identifier, key, e);
                return Ok(None);
            }
        };
        if sealed.len() < NONCE_LEN + TAG_LEN {
            warn!("EncryptedKeychain: {}: Truncated entry for key '{}'", self.identifier, key);
            return Ok(None);
        }

        let Some(master_key) = self.master_key() else {
            return Ok(None);
        };
        match open(&sealed, &master_key, &self.identifier) {
            Ok(encoded) => Ok(Some(Zeroizing::new(encoded))),
            Err(e) => {
                warn!("EncryptedKeychain: {}: Unable to open key '{}': {}", self.identifier, key, e);
                Ok(None)
            }
        }
    }

    fn get_value<T>(&self, key: &str, decode: fn(&[u8]) -> Result<T>) -> Result<Option<T>> {
        fail_on_reserved_key(key)?;
        let _guard = read_lock(&self.lock);
        let Some(encoded) = self.get_raw_value(key)? else {
            return Ok(None);
        };
        match decode(&encoded) {
            Ok(value) => Ok(Some(value)),
            Err(KeychainError::MalformedData(reason)) => {
                warn!("EncryptedKeychain: {}: Malformed value for key '{}': {}", self.identifier, key, reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Seal and store the encoded value, `None` removes the entry
    fn set_value(&self, key: &str, encoded: Option<Zeroizing<Vec<u8>>>) -> Result<()> {
        fail_on_reserved_key(key)?;
        let _guard = write_lock(&self.lock);
        let Some(encoded) = encoded else {
            return self.store.remove(key);
        };

        // Leave the entry untouched when the key can't be obtained
        let Some(master_key) = self.master_key() else {
            return Ok(());
        };
        match self.seal_value(&encoded, &master_key) {
            Ok(sealed) => self.store.put(key, StoredValue::Text(sealed)),
            Err(e @ KeychainError::ValueTooLarge { .. }) => Err(e),
            Err(e) => {
                error!("EncryptedKeychain: {}: Unable to seal key '{}': {}", self.identifier, key, e);
                Ok(())
            }
        }
    }
}

fn classify_legacy_entry(value: &StoredValue) -> LegacyEntry {
    match value {
        StoredValue::Text(text) if text.is_empty() => LegacyEntry::Drop("empty string"),
        StoredValue::Text(text) => match try_decode_base64(text) {
            Some(bytes) => LegacyEntry::Migrate(TypedValue::Bytes(bytes)),
            None => LegacyEntry::Migrate(TypedValue::String(text.clone())),
        },
        StoredValue::Boolean(value) => LegacyEntry::Migrate(TypedValue::Boolean(*value)),
        StoredValue::Long(value) => LegacyEntry::Migrate(TypedValue::Long(*value)),
        StoredValue::Float(value) => LegacyEntry::Migrate(TypedValue::Float(*value)),
        StoredValue::StringSet(set) => LegacyEntry::Migrate(TypedValue::StringSet(set.clone())),
        StoredValue::Int(_) => LegacyEntry::Drop("unsupported int kind"),
    }
}

/// Decode `text` as Base64 only if encoding the result reproduces it
///
/// Plain keychains never recorded whether text was a byte array, so any
/// string that round-trips is taken for bytes. Both the single-line form and
/// the 76-column wrapped form are accepted.
fn try_decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let decoded = STANDARD.decode(compact.as_bytes()).ok()?;
    let encoded = STANDARD.encode(&decoded);
    let trimmed = text.trim();
    if encoded == trimmed || wrap_lines(&encoded, BASE64_LINE_WIDTH) == trimmed {
        Some(decoded)
    } else {
        None
    }
}

fn wrap_lines(encoded: &str, width: usize) -> String {
    encoded
        .as_bytes()
        .chunks(width)
        .map(|line| String::from_utf8_lossy(line))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Keychain for EncryptedKeychain {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn is_encrypted(&self) -> bool {
        true
    }

    fn is_strongbox_backed(&self) -> bool {
        self.strongbox_backed
    }

    fn contains(&self, key: &str) -> Result<bool> {
        fail_on_reserved_key(key)?;
        let _guard = read_lock(&self.lock);
        Ok(self.get_raw_value(key)?.is_some())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.set_value(key, None)
    }

    fn remove_all(&self) -> Result<()> {
        let _guard = write_lock(&self.lock);
        let mut batch = StoreBatch::new();
        batch
            .clear()
            .put(VERSION_KEY, StoredValue::Int(KEYCHAIN_V1));
        self.store.apply(batch)
    }

    fn get_data(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .get_value(key, encoding::decode_bytes)?
            .filter(|data| !data.is_empty()))
    }

    fn put_data(&self, key: &str, data: Option<&[u8]>) -> Result<()> {
        let encoded = data
            .filter(|data| !data.is_empty())
            .map(|data| Zeroizing::new(encoding::encode_bytes(data)));
        self.set_value(key, encoded)
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get_value(key, encoding::decode_string)?
            .filter(|string| !string.is_empty()))
    }

    fn put_string(&self, key: &str, value: Option<&str>) -> Result<()> {
        self.set_value(key, value.map(|s| Zeroizing::new(encoding::encode_string(s))))
    }

    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        self.get_value(key, encoding::decode_string_set)
    }

    fn put_string_set(&self, key: &str, value: Option<&BTreeSet<String>>) -> Result<()> {
        let encoded = value
            .map(|set| encoding::encode_string_set(set).map(Zeroizing::new))
            .transpose()?;
        self.set_value(key, encoded)
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get_value(key, encoding::decode_bool)?.unwrap_or(default))
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, Some(Zeroizing::new(encoding::encode_bool(value))))
    }

    fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.get_value(key, encoding::decode_long)?.unwrap_or(default))
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, Some(Zeroizing::new(encoding::encode_long(value))))
    }

    fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        Ok(self.get_value(key, encoding::decode_float)?.unwrap_or(default))
    }

    fn put_float(&self, key: &str, value: f32) -> Result<()> {
        self.set_value(key, Some(Zeroizing::new(encoding::encode_float(value))))
    }
}
