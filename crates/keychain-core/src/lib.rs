//! # keychain-core
//!
//! Secrets-at-rest storage for small typed values:
//! - Tagged binary encoding of bytes, strings, string sets, booleans, longs and floats
//! - AES-256-GCM sealing bound to the keychain namespace
//! - Plain and encrypted keychain backends with one-time migration
//! - Factory selecting the backend from platform key store capabilities

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod factory;
pub mod keychain;
pub mod keys;
pub mod protection;
pub mod settings;
pub mod storage;

pub use error::{KeychainError, Result};
pub use encoding::{TypedValue, ValueType};
pub use factory::KeychainFactory;
pub use keychain::{EncryptedKeychain, Keychain, PlainKeychain};
pub use keys::{KeyringKeyStore, MasterKeyProvider, MemoryKeyStore, SecretKeyStore};
pub use protection::{DefaultProtectionSupport, KeychainProtection, ProtectionSupport, StaticProtectionSupport};
pub use settings::{KeychainSettings, SettingsManager};
pub use storage::{DurableStore, FileStoreProvider, MemoryStoreProvider, StoreProvider, StoredValue};
