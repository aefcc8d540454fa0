//! Keychain settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the
//! keychain namespaces.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{KeychainError, Result};

/// Default alias of the shared master key
pub const DEFAULT_MASTER_KEY_ALIAS: &str = "secure-keychain.master-key";

/// Version of the settings file layout written by this crate
pub const SETTINGS_VERSION: u32 = 1;

/// Default upper bound for a single encoded value
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64 * 1024;

/// Keychain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeychainSettings {
    /// Settings file version
    pub version: u32,
    /// Force plain keychains regardless of platform support (debug only)
    pub encryption_disabled: bool,
    /// Allow keys in a dedicated secure element when the platform has one
    pub strongbox_enabled: bool,
    /// Alias of the shared master key in the key store
    pub master_key_alias: String,
    /// Maximum size of an encoded value accepted for sealing, in bytes
    pub max_value_size: usize,
    /// Platforms (`std::env::consts::OS` names) whose key store is never trusted
    pub trust_denylist: Vec<String>,
}

impl KeychainSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self {
            version: SETTINGS_VERSION,
            encryption_disabled: false,
            strongbox_enabled: true,
            master_key_alias: DEFAULT_MASTER_KEY_ALIAS.to_string(),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            trust_denylist: Vec::new(),
        }
    }
}

impl Default for KeychainSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: KeychainSettings,
}

impl SettingsManager {
    /// Create a settings manager for the given directory
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join("settings.json");
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Failed to load settings from {:?}, using defaults: {}", settings_file, e);
            KeychainSettings::new()
        });

        Self {
            settings_file,
            settings,
        }
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<KeychainSettings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(KeychainSettings::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: KeychainSettings = serde_json::from_str(&contents)?;
        if settings.version > SETTINGS_VERSION {
            return Err(KeychainError::StorageError(format!(
                "Unsupported settings version {}",
                settings.version
            )));
        }
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.settings)?;

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        std::fs::write(&temp_path, &contents)?;
        std::fs::rename(&temp_path, &self.settings_file)?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &KeychainSettings {
        &self.settings
    }

    /// Get mutable settings
    pub fn get_mut(&mut self) -> &mut KeychainSettings {
        &mut self.settings
    }

    /// Update settings and save
    pub fn update(&mut self, settings: KeychainSettings) -> Result<()> {
        self.settings = settings;
        self.save()
    }

    /// Reset settings to defaults and delete settings file
    pub fn reset(&mut self) -> Result<()> {
        self.settings = KeychainSettings::new();

        if self.settings_file.exists() {
            std::fs::remove_file(&self.settings_file)
                .map_err(|e| KeychainError::StorageError(e.to_string()))?;
        }

        Ok(())
    }
}
