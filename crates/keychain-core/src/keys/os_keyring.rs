//! OS keychain key store
//!
//! Uses the system keychain for key storage:
//! - macOS: Keychain
//! - Windows: Credential Manager (DPAPI)
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! The 256-bit key is generated from the OS RNG and persisted hex-encoded as
//! the entry's password. It is never written anywhere else.

use keyring::Entry;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use super::SecretKeyStore;
use crate::crypto::MasterKey;
use crate::error::{KeychainError, Result};

/// Service name used for keychain entries
const SERVICE_NAME: &str = "secure-keychain";

/// OS keychain key store
pub struct KeyringKeyStore {
    /// Whether keychain is available
    available: bool,
}

impl KeyringKeyStore {
    /// Create a new key store, probing the OS keychain once
    pub fn new() -> Self {
        let available = Self::test_availability();

        if available {
            debug!("OS keychain is available");
        } else {
            warn!("OS keychain is not available");
        }

        Self { available }
    }

    /// Test if the keychain is available
    pub fn test_availability() -> bool {
        let test_entry = Entry::new(SERVICE_NAME, "__test_availability__");
        match test_entry {
            Ok(entry) => {
                // Try to set and delete a test value
                let result = entry.set_password("test");
                if result.is_ok() {
                    let _ = entry.delete_password();
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// Check if keychain is available
    pub fn is_available(&self) -> bool {
        self.available
    }

    fn get_entry(&self, alias: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, alias).map_err(|e| KeychainError::KeyStoreError(e.to_string()))
    }

    fn create_key(&self, entry: &Entry, alias: &str) -> Option<MasterKey> {
        let key = MasterKey::generate();
        let mut encoded = hex::encode(key.as_bytes());
        let result = entry.set_password(&encoded);
        encoded.zeroize();

        match result {
            Ok(()) => {
                info!("Created master key '{}' in {}", alias, self.backend_name());
                Some(key)
            }
            Err(e) => {
                error!("Failed to store master key '{}': {}", alias, e);
                None
            }
        }
    }
}

impl Default for KeyringKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretKeyStore for KeyringKeyStore {
    fn get_or_create_key(&self, alias: &str, allow_create: bool) -> Option<MasterKey> {
        if !self.available {
            error!("Unable to acquire master key '{}': keychain not available", alias);
            return None;
        }

        let entry = match self.get_entry(alias) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Unable to acquire master key '{}': {}", alias, e);
                return None;
            }
        };

        match entry.get_password() {
            Ok(mut encoded) => {
                let key = hex::decode(encoded.trim())
                    .ok()
                    .and_then(|mut bytes| {
                        let key = MasterKey::from_slice(&bytes);
                        bytes.zeroize();
                        key
                    });
                encoded.zeroize();
                if key.is_none() {
                    // Never replace a damaged key, content sealed with it may still be recoverable
                    error!("Master key '{}' in keychain is malformed", alias);
                }
                key
            }
            Err(keyring::Error::NoEntry) if allow_create => self.create_key(&entry, alias),
            Err(keyring::Error::NoEntry) => {
                debug!("Master key '{}' not found in keychain", alias);
                None
            }
            Err(e) => {
                error!("Unable to acquire master key '{}': {}", alias, e);
                None
            }
        }
    }

    fn delete_key(&self, alias: &str) -> Result<()> {
        if !self.available {
            return Err(KeychainError::KeyStoreError(
                "Keychain not available".to_string(),
            ));
        }

        let entry = self.get_entry(alias)?;

        match entry.delete_password() {
            Ok(()) => {
                debug!("Deleted master key '{}' from keychain", alias);
                Ok(())
            }
            // Key doesn't exist, that's fine
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::KeyStoreError(e.to_string())),
        }
    }

    fn contains_key(&self, alias: &str) -> bool {
        if !self.available {
            return false;
        }

        match self.get_entry(alias) {
            Ok(entry) => entry.get_password().is_ok(),
            Err(_) => false,
        }
    }

    fn is_inside_secure_hardware(&self, _alias: &str) -> bool {
        // The key is a password entry read into process memory; none of the
        // supported backends keeps it inside secure hardware
        false
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        return "macOS Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        return "System Keychain";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keychain_availability() {
        let store = KeyringKeyStore::new();
        // Just check that we can query availability without panicking
        let _ = store.is_available();
        assert!(!store.backend_name().is_empty());
    }

    #[test]
    fn test_keys_are_software_keys() {
        let store = KeyringKeyStore { available: true };
        assert!(!store.is_inside_secure_hardware("secure-keychain.master-key"));
    }
}
