//! Cryptographic operations for webhook secrets and payload signing.
//!
//! - AES-256-GCM encryption/decryption for event webhook secrets at rest
//! - HMAC-SHA256 computation for webhook payload signatures

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Prefix of generated webhook secrets.
const SECRET_PREFIX: &str = "whsec_";

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Webhook secret generation
// ---------------------------------------------------------------------------

/// Generate a fresh webhook secret (`whsec_` + 32 random bytes, hex).
#[must_use]
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// AES-256-GCM encryption/decryption (for secrets at rest)
// ---------------------------------------------------------------------------

/// Encrypt a plaintext secret to a base64-encoded string for DB storage.
///
/// Format: base64(nonce || ciphertext || auth_tag)
pub fn encrypt_secret(plaintext: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&result))
}

/// Decrypt a base64-encoded secret from DB storage back to plaintext.
pub fn decrypt_secret(encoded: &str, key: &[u8]) -> Result<String, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }

    let encrypted = BASE64
        .decode(encoded)
        .map_err(|e| WebhookError::EncryptionFailed(format!("Base64 decode failed: {e}")))?;

    if encrypted.len() < NONCE_SIZE + 1 {
        return Err(WebhookError::EncryptionFailed(
            "Invalid encrypted data format".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
    let ciphertext = &encrypted[NONCE_SIZE..];

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

/// Resolve a stored webhook secret.
///
/// With a key configured, stored secrets are ciphertext; without one (dev
/// deployments) they are plaintext.
pub fn reveal_secret(stored: &str, key: Option<&[u8; 32]>) -> Result<String, WebhookError> {
    match key {
        Some(key) => decrypt_secret(stored, key),
        None => Ok(stored.to_string()),
    }
}

/// Prepare a webhook secret for storage, encrypting when a key is set.
pub fn protect_secret(plaintext: &str, key: Option<&[u8; 32]>) -> Result<String, WebhookError> {
    match key {
        Some(key) => encrypt_secret(plaintext, key),
        None => Ok(plaintext.to_string()),
    }
}

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Compute HMAC-SHA256 signature for a webhook payload.
///
/// The signature covers `{timestamp}.{body}` to prevent replay attacks.
/// Returns hex-encoded signature string.
pub fn compute_hmac_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify an HMAC-SHA256 signature using constant-time comparison.
pub fn verify_hmac_signature(
    expected_hex: &str,
    secret: &str,
    timestamp: &str,
    body: &[u8],
) -> bool {
    let computed = compute_hmac_signature(secret, timestamp, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    // --- Secret generation ---

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_webhook_secret();
        assert!(secret.starts_with("whsec_"));
        assert_eq!(secret.len(), SECRET_PREFIX.len() + 64);
        assert_ne!(secret, generate_webhook_secret());
    }

    // --- AES-GCM tests ---

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = "whsec_0123456789abcdef";

        let encrypted = encrypt_secret(plaintext, &key).expect("encryption failed");
        let decrypted = decrypt_secret(&encrypted, &key).expect("decryption failed");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_different_encryptions_produce_different_ciphertext() {
        let key = test_key();
        let enc1 = encrypt_secret("same-secret", &key).unwrap();
        let enc2 = encrypt_secret("same-secret", &key).unwrap();
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        assert!(encrypt_secret("test", &short_key).is_err());
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let encrypted = encrypt_secret("secret", &[0x42u8; 32]).unwrap();
        assert!(decrypt_secret(&encrypted, &[0x43u8; 32]).is_err());
    }

    #[test]
    fn test_decrypt_invalid_base64() {
        assert!(decrypt_secret("not-valid-base64!!!", &test_key()).is_err());
    }

    #[test]
    fn test_reveal_secret_plaintext_without_key() {
        assert_eq!(reveal_secret("whsec_plain", None).unwrap(), "whsec_plain");
    }

    #[test]
    fn test_protect_reveal_roundtrip_with_key() {
        let key = test_key();
        let stored = protect_secret("whsec_abc", Some(&key)).unwrap();
        assert_ne!(stored, "whsec_abc");
        assert_eq!(reveal_secret(&stored, Some(&key)).unwrap(), "whsec_abc");
    }

    // --- HMAC-SHA256 tests ---

    #[test]
    fn test_hmac_signature_deterministic() {
        let sig1 = compute_hmac_signature("secret", "1706400000000", b"payload");
        let sig2 = compute_hmac_signature("secret", "1706400000000", b"payload");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_hmac_signature_changes_with_inputs() {
        let base = compute_hmac_signature("secret", "1706400000000", b"payload");
        assert_ne!(
            base,
            compute_hmac_signature("other", "1706400000000", b"payload")
        );
        assert_ne!(
            base,
            compute_hmac_signature("secret", "1706400000001", b"payload")
        );
        assert_ne!(
            base,
            compute_hmac_signature("secret", "1706400000000", b"payload2")
        );
    }

    #[test]
    fn test_hmac_signature_is_hex_encoded() {
        let sig = compute_hmac_signature("secret", "1706400000000", b"payload");
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_hmac_signature_roundtrip() {
        let sig = compute_hmac_signature("my-secret", "1706400000000", b"test-body");
        assert!(verify_hmac_signature(&sig, "my-secret", "1706400000000", b"test-body"));
    }

    #[test]
    fn test_verify_rejects_mutation() {
        let sig = compute_hmac_signature("my-secret", "1706400000000", b"test-body");
        assert!(!verify_hmac_signature(&sig, "my-secret", "1706400000000", b"test-bodY"));

        let mut flipped = sig.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!verify_hmac_signature(&flipped, "my-secret", "1706400000000", b"test-body"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"hi"));
        assert!(!constant_time_eq(b"hello", b"world"));
    }
}
