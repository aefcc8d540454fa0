//! Keychain protection levels and platform capability detection

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::keys::KeyringKeyStore;
use crate::settings::KeychainSettings;

/// Level of protection applied to keychain content, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeychainProtection {
    /// Content is stored without encryption
    None,
    /// Content is encrypted with a key that lives outside secure hardware
    Software,
    /// Content is encrypted with a key held in secure hardware
    Hardware,
    /// Content is encrypted with a key held in a dedicated secure element
    StrongBox,
}

impl fmt::Display for KeychainProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeychainProtection::None => "none",
            KeychainProtection::Software => "software",
            KeychainProtection::Hardware => "hardware",
            KeychainProtection::StrongBox => "strongbox",
        };
        f.write_str(name)
    }
}

/// Platform capabilities consulted by the keychain factory
pub trait ProtectionSupport: Send + Sync {
    /// The platform offers a key store usable for the master key
    fn supports_hardware_keys(&self) -> bool;

    /// Keys from the platform key store can be relied upon
    fn is_hardware_key_trusted(&self) -> bool;

    /// The platform has a dedicated secure element
    fn is_strongbox_supported(&self) -> bool;

    /// The secure element may be used
    fn is_strongbox_enabled(&self) -> bool;
}

/// Capabilities of the current desktop platform
#[derive(Debug, Clone)]
pub struct DefaultProtectionSupport {
    keystore_available: bool,
    trusted: bool,
    strongbox_enabled: bool,
}

impl DefaultProtectionSupport {
    /// Detect capabilities using the probed OS keychain and the settings'
    /// trust deny-list
    pub fn detect(settings: &KeychainSettings, key_store: &KeyringKeyStore) -> Self {
        let platform = std::env::consts::OS;
        let trusted = !settings
            .trust_denylist
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(platform));

        if !trusted {
            warn!("Key store on platform '{}' is on the trust deny-list", platform);
        }
        debug!(
            "Detected protection support: keystore={}, trusted={}",
            key_store.is_available(),
            trusted
        );

        Self {
            keystore_available: key_store.is_available(),
            trusted,
            strongbox_enabled: settings.strongbox_enabled,
        }
    }
}

impl ProtectionSupport for DefaultProtectionSupport {
    fn supports_hardware_keys(&self) -> bool {
        self.keystore_available
    }

    fn is_hardware_key_trusted(&self) -> bool {
        self.trusted
    }

    fn is_strongbox_supported(&self) -> bool {
        // Desktop key stores expose no dedicated secure element
        false
    }

    fn is_strongbox_enabled(&self) -> bool {
        self.is_strongbox_supported() && self.strongbox_enabled
    }
}

/// Fixed capabilities, for tests and embedders that detect them elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProtectionSupport {
    pub hardware_keys: bool,
    pub trusted: bool,
    pub strongbox_supported: bool,
    pub strongbox_enabled: bool,
}

impl StaticProtectionSupport {
    /// No key store at all
    pub fn unsupported() -> Self {
        Self {
            hardware_keys: false,
            trusted: false,
            strongbox_supported: false,
            strongbox_enabled: false,
        }
    }

    /// A trusted key store without a secure element
    pub fn trusted() -> Self {
        Self {
            hardware_keys: true,
            trusted: true,
            strongbox_supported: false,
            strongbox_enabled: false,
        }
    }

    /// A key store that exists but is known to be unreliable
    pub fn untrusted() -> Self {
        Self {
            trusted: false,
            ..Self::trusted()
        }
    }
}

impl ProtectionSupport for StaticProtectionSupport {
    fn supports_hardware_keys(&self) -> bool {
        self.hardware_keys
    }

    fn is_hardware_key_trusted(&self) -> bool {
        self.trusted
    }

    fn is_strongbox_supported(&self) -> bool {
        self.strongbox_supported
    }

    fn is_strongbox_enabled(&self) -> bool {
        self.strongbox_supported && self.strongbox_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_ordering() {
        assert!(KeychainProtection::None < KeychainProtection::Software);
        assert!(KeychainProtection::Software < KeychainProtection::Hardware);
        assert!(KeychainProtection::Hardware < KeychainProtection::StrongBox);
    }

    #[test]
    fn test_strongbox_requires_support() {
        let support = StaticProtectionSupport {
            strongbox_enabled: true,
            ..StaticProtectionSupport::trusted()
        };
        assert!(!support.is_strongbox_enabled());

        let support = StaticProtectionSupport {
            strongbox_supported: true,
            ..support
        };
        assert!(support.is_strongbox_enabled());
    }

    #[test]
    fn test_denylist_marks_platform_untrusted() {
        let settings = KeychainSettings {
            trust_denylist: vec![std::env::consts::OS.to_uppercase()],
            ..KeychainSettings::new()
        };
        let support = DefaultProtectionSupport::detect(&settings, &KeyringKeyStore::new());
        assert!(!support.is_hardware_key_trusted());

        let support = DefaultProtectionSupport::detect(&KeychainSettings::new(), &KeyringKeyStore::new());
        assert!(support.is_hardware_key_trusted());
        assert!(!support.is_strongbox_enabled());
    }
}
