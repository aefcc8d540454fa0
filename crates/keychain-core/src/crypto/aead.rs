//! AES-256-GCM sealing for keychain values
//!
//! Sealed format: `nonce[12] || ciphertext || tag[16]`
//! - Nonce: 12 bytes (96 bits), fresh for every call
//! - Tag: 16 bytes (128 bits)
//! - Associated data: UTF-8 bytes of the namespace identifier
//!
//! The master key is long-lived and shared by every namespace, so nonce
//! uniqueness must hold across concurrent callers. Each nonce is drawn from
//! `OsRng`, which keeps no state shared between threads.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use super::MasterKey;
use crate::error::{KeychainError, Result};

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Seal plaintext with AES-256-GCM, binding `aad` into the tag
///
/// # Returns
/// `nonce || ciphertext || tag`
pub fn seal(plaintext: &[u8], key: &MasterKey, aad: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| KeychainError::EncryptionError(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    // aes-gcm appends the auth tag to the ciphertext
    let ciphertext_with_tag = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| KeychainError::EncryptionError(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext_with_tag);
    Ok(sealed)
}

/// Open a value produced by [`seal`]
///
/// Tampering, a wrong key, a different `aad`, or a value shorter than
/// nonce + tag all produce `DecryptionError`. Input shorter than nonce + tag
/// never reaches the cipher.
pub fn open(sealed: &[u8], key: &MasterKey, aad: &str) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(KeychainError::DecryptionError(format!(
            "Sealed value too short: expected at least {}, got {}",
            NONCE_LEN + TAG_LEN,
            sealed.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| KeychainError::DecryptionError(e.to_string()))?;

    let (nonce, ciphertext_with_tag) = sealed.split_at(NONCE_LEN);
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_with_tag,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| KeychainError::DecryptionError(e.to_string()))
}
