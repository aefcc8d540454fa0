//! Keychain factory
//!
//! Decides once per namespace identifier whether the keychain is plain or
//! encrypted, migrates plain content on the first encrypted open, and caches
//! the instance. The factory is meant to be created once and shared for the
//! lifetime of the process. It has no teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{KeychainError, Result};
use crate::keychain::{EncryptedKeychain, Keychain, PlainKeychain};
use crate::keys::{MasterKeyProvider, SecretKeyStore};
use crate::protection::{KeychainProtection, ProtectionSupport};
use crate::settings::KeychainSettings;
use crate::storage::StoreProvider;

/// Creates and caches keychains for namespace identifiers
pub struct KeychainFactory {
    settings: KeychainSettings,
    protection_support: Arc<dyn ProtectionSupport>,
    key_store: Arc<dyn SecretKeyStore>,
    store_provider: Arc<dyn StoreProvider>,
    encryption_disabled: AtomicBool,
    shared: Mutex<SharedState>,
}

/// State guarded by the factory-wide lock
#[derive(Default)]
struct SharedState {
    keychains: HashMap<String, Arc<dyn Keychain>>,
    key_provider: Option<Arc<MasterKeyProvider>>,
    protection: Option<KeychainProtection>,
}

impl KeychainFactory {
    pub fn new(
        settings: KeychainSettings,
        protection_support: Arc<dyn ProtectionSupport>,
        key_store: Arc<dyn SecretKeyStore>,
        store_provider: Arc<dyn StoreProvider>,
    ) -> Self {
        let encryption_disabled = AtomicBool::new(settings.encryption_disabled);
        Self {
            settings,
            protection_support,
            key_store,
            store_provider,
            encryption_disabled,
            shared: Mutex::new(SharedState::default()),
        }
    }

    pub fn settings(&self) -> &KeychainSettings {
        &self.settings
    }

    /// Force plain keychains for identifiers that are not cached yet
    pub fn set_encryption_disabled(&self, disabled: bool) {
        self.encryption_disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn is_encryption_disabled(&self) -> bool {
        self.encryption_disabled.load(Ordering::SeqCst)
    }

    /// Get the keychain for `identifier`, creating it on first request
    pub fn get_keychain(&self, identifier: &str) -> Result<Arc<dyn Keychain>> {
        self.get_keychain_with_protection(identifier, KeychainProtection::None)
    }

    /// Get the keychain for `identifier` if the platform offers at least
    /// `minimum` protection
    pub fn get_keychain_with_protection(
        &self,
        identifier: &str,
        minimum: KeychainProtection,
    ) -> Result<Arc<dyn Keychain>> {
        let mut shared = self.lock_shared()?;

        let available = self.effective_protection(&mut shared);
        if minimum > available {
            return Err(KeychainError::InsufficientProtection {
                required: minimum,
                available,
            });
        }

        if let Some(keychain) = shared.keychains.get(identifier) {
            return Ok(keychain.clone());
        }

        let keychain = self.create_keychain(&mut shared, identifier)?;
        debug!(
            "KeychainFactory: {}: Created {} keychain",
            identifier,
            if keychain.is_encrypted() { "encrypted" } else { "plain" }
        );
        shared.keychains.insert(identifier.to_string(), keychain.clone());
        Ok(keychain)
    }

    /// Protection level applied to keychains created from now on
    pub fn protection_level(&self) -> Result<KeychainProtection> {
        let mut shared = self.lock_shared()?;
        Ok(self.effective_protection(&mut shared))
    }

    fn lock_shared(&self) -> Result<MutexGuard<'_, SharedState>> {
        self.shared
            .lock()
            .map_err(|_| KeychainError::StorageError("Failed to acquire factory lock".to_string()))
    }

    fn effective_protection(&self, shared: &mut SharedState) -> KeychainProtection {
        if self.is_encryption_disabled() {
            return KeychainProtection::None;
        }
        self.detect_protection(shared)
    }

    /// Determined once, then cached for the lifetime of the factory
    fn detect_protection(&self, shared: &mut SharedState) -> KeychainProtection {
        if let Some(protection) = shared.protection {
            return protection;
        }
        let protection = self.compute_protection(shared);
        info!("KeychainFactory: Keychain protection level is '{}'", protection);
        shared.protection = Some(protection);
        protection
    }

    fn compute_protection(&self, shared: &mut SharedState) -> KeychainProtection {
        let support = &self.protection_support;
        if !support.supports_hardware_keys() {
            info!("KeychainFactory: Platform has no usable key store");
            return KeychainProtection::None;
        }
        if !support.is_hardware_key_trusted() {
            warn!("KeychainFactory: Platform key store is not trusted");
            return KeychainProtection::None;
        }

        let key_provider = self.key_provider(shared);
        if !EncryptedKeychain::verify_keystore_encryption(&key_provider) {
            return KeychainProtection::None;
        }

        if !key_provider.is_inside_secure_hardware() {
            KeychainProtection::Software
        } else if support.is_strongbox_supported() && support.is_strongbox_enabled() {
            KeychainProtection::StrongBox
        } else {
            KeychainProtection::Hardware
        }
    }

    fn key_provider(&self, shared: &mut SharedState) -> Arc<MasterKeyProvider> {
        shared
            .key_provider
            .get_or_insert_with(|| {
                Arc::new(MasterKeyProvider::new(
                    self.key_store.clone(),
                    self.settings.master_key_alias.clone(),
                ))
            })
            .clone()
    }

    fn create_keychain(&self, shared: &mut SharedState, identifier: &str) -> Result<Arc<dyn Keychain>> {
        let store = self.store_provider.open(identifier)?;
        let already_encrypted = EncryptedKeychain::is_encrypted_content_present(store.as_ref())?;

        if self.is_encryption_disabled() {
            warn!("KeychainFactory: {}: Encryption is disabled, using plain keychain", identifier);
        } else {
            let protection = self.detect_protection(shared);
            if protection != KeychainProtection::None {
                let keychain = EncryptedKeychain::new(identifier, store.clone(), self.key_provider(shared))
                    .with_strongbox_backed(protection == KeychainProtection::StrongBox)
                    .with_max_value_size(self.settings.max_value_size);
                if already_encrypted || keychain.import_from_legacy_keychain(store.as_ref()) {
                    return Ok(Arc::new(keychain));
                }
                warn!("KeychainFactory: {}: Migration failed, keeping plain keychain", identifier);
            }
        }

        let keychain = PlainKeychain::new(identifier, store);
        if already_encrypted {
            // Sealed content can't be opened any more
            error!(
                "KeychainFactory: {}: The content was previously encrypted but encryption is no longer available",
                identifier
            );
            keychain.remove_all()?;
        }
        Ok(Arc::new(keychain))
    }
}
