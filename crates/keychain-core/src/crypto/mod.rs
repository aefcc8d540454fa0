//! Cryptographic primitives for keychain sealing
//!
//! This module provides:
//! - AES-256-GCM sealing with namespace-bound associated data
//! - The zeroize-on-drop master key

mod aead;
mod secure_memory;

pub use aead::{open, seal, NONCE_LEN, TAG_LEN};
pub use secure_memory::{MasterKey, MASTER_KEY_LEN};
