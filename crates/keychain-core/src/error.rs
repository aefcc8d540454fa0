//! Error types for keychain-core

use thiserror::Error;

use crate::encoding::ValueType;
use crate::protection::KeychainProtection;

/// Result type alias for keychain operations
pub type Result<T> = std::result::Result<T, KeychainError>;

/// Keychain error types
///
/// Only contract violations (`TypeMismatch`, `ReservedKey`, `ValueTooLarge`,
/// `InsufficientProtection`) and durable store failures reach the public
/// accessors. Missing, malformed, or undecryptable entries are reported as
/// absent values instead.
#[derive(Error, Debug)]
pub enum KeychainError {
    #[error("Requesting '{expected}' but keychain contains '{found}' type")]
    TypeMismatch { expected: ValueType, found: String },

    #[error("Malformed keychain data: {0}")]
    MalformedData(String),

    #[error("Key '{0}' is reserved for internal keychain use")]
    ReservedKey(String),

    #[error("Device doesn't support required level of keychain protection: required {required}, available {available}")]
    InsufficientProtection {
        required: KeychainProtection,
        available: KeychainProtection,
    },

    #[error("Value is too large: {len} bytes, maximum is {max} bytes")]
    ValueTooLarge { len: usize, max: usize },

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Key store error: {0}")]
    KeyStoreError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl KeychainError {
    /// True for errors caused by the caller breaking the accessor contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            KeychainError::TypeMismatch { .. }
                | KeychainError::ReservedKey(_)
                | KeychainError::ValueTooLarge { .. }
        )
    }
}
