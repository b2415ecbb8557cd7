//! AES-256-GCM encryption for stored tokens.
//!
//! Each token is encrypted with a fresh random 12-byte IV. Ciphertext and the
//! 16-byte authentication tag are returned as separate base64 fields so the
//! store can check each one independently.

use super::EncryptedPayload;
use crate::error::{CipherError, DecryptionError};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the IV in bytes (96 bits, standard for GCM)
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric cipher for bearer tokens.
///
/// Holds a single 256-bit key. All key access goes through one private accessor,
/// so swapping the key source only touches that accessor.
#[derive(Clone)]
pub struct TokenCipher {
    key: Key<Aes256Gcm>,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Creates a cipher from raw key bytes (must be exactly 32 bytes).
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        if key_bytes.len() != KEY_SIZE {
            return Err(anyhow!(
                "Encryption key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ));
        }

        Ok(Self {
            key: Key::<Aes256Gcm>::clone_from_slice(key_bytes),
        })
    }

    /// Creates a cipher from a base64-encoded 32-byte key.
    ///
    /// # Arguments
    /// * `key_base64` - Base64-encoded master key (from configuration)
    pub fn from_base64_key(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .context("Failed to decode base64 encryption key")?;

        Self::new(&key_bytes)
    }

    fn key(&self) -> &Key<Aes256Gcm> {
        &self.key
    }

    /// Encrypts a token with a fresh random IV.
    ///
    /// # Security
    /// - IV comes from the OS CSPRNG on every call and is never reused
    /// - Authenticated encryption (tampering detected on decrypt)
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, CipherError> {
        if plaintext.is_empty() {
            return Err(CipherError("refusing to encrypt an empty token".to_string()));
        }

        let cipher = Aes256Gcm::new(self.key());

        // Generate random IV (never reuse!)
        let iv = Aes256Gcm::generate_nonce(&mut OsRng);

        // The primitive appends the tag to the ciphertext
        let mut sealed = cipher
            .encrypt(&iv, plaintext.as_bytes())
            .map_err(|e| CipherError(e.to_string()))?;

        if sealed.len() < TAG_SIZE {
            return Err(CipherError("sealed output shorter than tag".to_string()));
        }
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(EncryptedPayload {
            ciphertext: BASE64.encode(&sealed),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(&tag),
        })
    }

    /// Decrypts a payload produced by [`TokenCipher::encrypt`].
    ///
    /// # Returns
    /// * `Ok(String)` - Decrypted token
    /// * `Err(DecryptionError)` - Missing/malformed field, wrong key, or tampered data
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String, DecryptionError> {
        let mut sealed = decode_field("ciphertext", &payload.ciphertext, None)?;
        let iv = decode_field("iv", &payload.iv, Some(IV_SIZE))?;
        let tag = decode_field("auth_tag", &payload.auth_tag, Some(TAG_SIZE))?;

        // Rebuild the single buffer the primitive expects: ciphertext || tag
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(self.key());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| DecryptionError::TagMismatch)?;

        String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidUtf8)
    }
}

fn decode_field(
    field: &'static str,
    value: &str,
    expected_len: Option<usize>,
) -> Result<Vec<u8>, DecryptionError> {
    if value.is_empty() {
        return Err(DecryptionError::MissingField(field));
    }

    let bytes = BASE64
        .decode(value)
        .map_err(|_| DecryptionError::InvalidEncoding(field))?;

    if let Some(expected) = expected_len {
        if bytes.len() != expected {
            return Err(DecryptionError::InvalidLength {
                field,
                expected,
                actual: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new(&[7u8; 32]).unwrap()
    }

    /// Flips one bit inside a base64 field and re-encodes it.
    fn flip_bit(field: &str, byte: usize, bit: u8) -> String {
        let mut bytes = BASE64.decode(field).unwrap();
        bytes[byte] ^= 1 << bit;
        BASE64.encode(bytes)
    }

    #[test]
    fn test_key_validation() {
        // Valid 32-byte key (base64-encoded)
        let valid_key = BASE64.encode([0u8; 32]);
        assert!(TokenCipher::from_base64_key(&valid_key).is_ok());

        // Too short
        let short_key = BASE64.encode([0u8; 16]);
        assert!(TokenCipher::from_base64_key(&short_key).is_err());

        // Too long
        let long_key = BASE64.encode([0u8; 64]);
        assert!(TokenCipher::from_base64_key(&long_key).is_err());

        // Invalid base64
        assert!(TokenCipher::from_base64_key("not-valid-base64!@#$").is_err());
    }

    /// Covers non-empty tokens; the empty token is rejected by `encrypt`.
    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let long = "x".repeat(4096);

        for plaintext in ["my-secret-access-token-12345", "ünïcödé-tøken", long.as_str()] {
            let payload = cipher.encrypt(plaintext).expect("Encryption failed");
            assert_ne!(payload.ciphertext, plaintext);
            assert_eq!(cipher.decrypt(&payload).expect("Decryption failed"), plaintext);
        }
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(test_cipher().encrypt("").is_err());
    }

    #[test]
    fn test_field_sizes() {
        let payload = test_cipher().encrypt("abc").unwrap();

        assert_eq!(BASE64.decode(&payload.iv).unwrap().len(), IV_SIZE);
        assert_eq!(BASE64.decode(&payload.auth_tag).unwrap().len(), TAG_SIZE);
        // GCM is a stream mode: ciphertext length equals plaintext length
        assert_eq!(BASE64.decode(&payload.ciphertext).unwrap().len(), 3);
    }

    #[test]
    fn test_ivs_are_unique() {
        let cipher = test_cipher();
        let ivs: HashSet<String> = (0..10_000)
            .map(|_| cipher.encrypt("same-plaintext").unwrap().iv)
            .collect();

        assert_eq!(ivs.len(), 10_000);
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = test_cipher().encrypt("secret").unwrap();
        let other = TokenCipher::new(&[8u8; 32]).unwrap();

        assert_eq!(other.decrypt(&payload), Err(DecryptionError::TagMismatch));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher();
        let payload = cipher.encrypt("access-token-value").unwrap();
        let len = BASE64.decode(&payload.ciphertext).unwrap().len();

        for byte in 0..len {
            for bit in 0..8 {
                let tampered = EncryptedPayload {
                    ciphertext: flip_bit(&payload.ciphertext, byte, bit),
                    ..payload.clone()
                };
                assert_eq!(cipher.decrypt(&tampered), Err(DecryptionError::TagMismatch));
            }
        }
    }

    #[test]
    fn test_tampered_iv_fails() {
        let cipher = test_cipher();
        let payload = cipher.encrypt("access-token-value").unwrap();

        for byte in 0..IV_SIZE {
            for bit in 0..8 {
                let tampered = EncryptedPayload {
                    iv: flip_bit(&payload.iv, byte, bit),
                    ..payload.clone()
                };
                assert_eq!(cipher.decrypt(&tampered), Err(DecryptionError::TagMismatch));
            }
        }
    }

    #[test]
    fn test_tampered_tag_fails() {
        let cipher = test_cipher();
        let payload = cipher.encrypt("access-token-value").unwrap();

        for byte in 0..TAG_SIZE {
            for bit in 0..8 {
                let tampered = EncryptedPayload {
                    auth_tag: flip_bit(&payload.auth_tag, byte, bit),
                    ..payload.clone()
                };
                assert_eq!(cipher.decrypt(&tampered), Err(DecryptionError::TagMismatch));
            }
        }
    }

    #[test]
    fn test_missing_or_malformed_fields() {
        let cipher = test_cipher();
        let payload = cipher.encrypt("secret").unwrap();

        let missing_tag = EncryptedPayload {
            auth_tag: String::new(),
            ..payload.clone()
        };
        assert_eq!(
            cipher.decrypt(&missing_tag),
            Err(DecryptionError::MissingField("auth_tag"))
        );

        let bad_iv = EncryptedPayload {
            iv: "%%%".to_string(),
            ..payload.clone()
        };
        assert_eq!(cipher.decrypt(&bad_iv), Err(DecryptionError::InvalidEncoding("iv")));

        let short_tag = EncryptedPayload {
            auth_tag: BASE64.encode([0u8; 8]),
            ..payload
        };
        assert_eq!(
            cipher.decrypt(&short_tag),
            Err(DecryptionError::InvalidLength {
                field: "auth_tag",
                expected: TAG_SIZE,
                actual: 8,
            })
        );
    }
}
