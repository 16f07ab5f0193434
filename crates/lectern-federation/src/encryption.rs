//! At-rest encryption for speaker PII fields.
//!
//! Encrypted values are stored as `enc:v1:` followed by base64 of
//! `nonce (12 bytes) || ciphertext`. The marker lets migrations and the
//! repository distinguish ciphertext from legacy plaintext rows.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::error::{FederationError, FederationResult};

/// AES-256-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// Version-prefixed marker for encrypted values.
const MARKER: &str = "enc:v1:";

/// Field-level encryptor for PII columns.
#[derive(Clone)]
pub struct FieldEncryptor {
    key: [u8; 32],
}

impl std::fmt::Debug for FieldEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryptor").finish_non_exhaustive()
    }
}

impl FieldEncryptor {
    /// Create an encryptor from a 32-byte key.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Whether a stored value carries the encryption marker.
    #[must_use]
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(MARKER)
    }

    /// Encrypt a field value. Already-encrypted values pass through
    /// unchanged so re-running a migration is safe.
    pub fn encrypt(&self, plaintext: &str) -> FederationResult<String> {
        if Self::is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| FederationError::EncryptionFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| FederationError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{MARKER}{}", BASE64.encode(combined)))
    }

    /// Decrypt a field value. Unmarked values are returned as-is so rows
    /// written before encryption was enabled still read correctly.
    pub fn decrypt(&self, stored: &str) -> FederationResult<String> {
        let Some(encoded) = stored.strip_prefix(MARKER) else {
            return Ok(stored.to_string());
        };

        let combined = BASE64
            .decode(encoded)
            .map_err(|e| FederationError::DecryptionFailed(format!("invalid base64: {e}")))?;

        if combined.len() < NONCE_SIZE {
            return Err(FederationError::DecryptionFailed(
                "Encrypted value too short".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| FederationError::DecryptionFailed(e.to_string()))?;

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| FederationError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| FederationError::DecryptionFailed(e.to_string()))
    }
}

/// Generate a random 32-byte encryption key.
#[must_use]
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random encryption key as a base64 string, for operator setup.
#[must_use]
pub fn generate_key_base64() -> String {
    BASE64.encode(generate_key())
}
