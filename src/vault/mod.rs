//! Per-profile secret encryption.
//!
//! Every profile owns a random 256-bit key generated when the profile is
//! created. Secrets are sealed with ChaCha20-Poly1305 under a fresh nonce and
//! stored as `base64(nonce || ciphertext || tag)`. The key never leaves the
//! record store and is never derived from profile data.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::core::VaultError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Clone, PartialEq, Eq)]
pub struct ProfileKey([u8; KEY_LEN]);

impl ProfileKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Storage form of the key.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(format!("not base64: {}", e)))?;

        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            VaultError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, v.len()))
        })?;

        Ok(Self(bytes))
    }

    /// Short, non-reversible identifier safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileKey({})", self.fingerprint())
    }
}

pub fn generate_key() -> ProfileKey {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    ProfileKey(bytes)
}

pub fn encrypt(key: &ProfileKey, plaintext: &str) -> Result<String, VaultError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);

    Ok(BASE64.encode(out))
}

pub fn decrypt(key: &ProfileKey, ciphertext: &str) -> Result<String, VaultError> {
    let raw = BASE64
        .decode(ciphertext.trim())
        .map_err(|e| VaultError::Decryption(format!("not base64: {}", e)))?;

    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Decryption("ciphertext too short".to_string()));
    }

    let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| VaultError::Decryption("wrong key or corrupted ciphertext".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".to_string()))
}
