//! Keychain master key, wiped from memory when dropped

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the AES-256 master key in bytes
pub const MASTER_KEY_LEN: usize = 32;

/// Key sealing every encrypted keychain in the process
///
/// Copies made with `clone` are wiped independently when they go out of scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn new(key: [u8; MASTER_KEY_LEN]) -> Self {
        Self { key }
    }

    /// Draw a fresh key from the OS RNG
    pub fn generate() -> Self {
        let mut key = Self::new([0u8; MASTER_KEY_LEN]);
        OsRng.fill_bytes(&mut key.key);
        key
    }

    /// Raw key material, only for handing to the cipher
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.key
    }

    /// `None` unless `slice` holds exactly [`MASTER_KEY_LEN`] bytes
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; MASTER_KEY_LEN]>::try_from(slice).ok().map(Self::new)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
