//! Secret key stores holding the shared keychain master key
//!
//! This module provides two key store backends:
//! 1. OS keychain (software keys guarded by the platform keychain)
//! 2. Process memory (tests, ephemeral processes)

mod traits;
mod os_keyring;
mod memory;
mod provider;

pub use traits::SecretKeyStore;
pub use os_keyring::KeyringKeyStore;
pub use memory::MemoryKeyStore;
pub use provider::MasterKeyProvider;
