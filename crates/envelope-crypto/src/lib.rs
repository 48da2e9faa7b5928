//! Envelope codec for commands arriving on the TCP control channel.
//!
//! An envelope is a small JSON object carrying a base64 3DES-EDE3
//! ciphertext, the declared plaintext length, and an HMAC-SHA256 tag over
//! the ciphertext. Opening checks the tag first, then decrypts and
//! validates the length, so a tampered message never yields plaintext.

mod envelope;
mod mac;
mod tdes;

pub use envelope::{open, open_bytes, seal, Envelope};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// 3DES-EDE3 key size in bytes.
pub const KEY_LEN: usize = 24;

/// Raw symmetric key.
pub type KeyBytes = [u8; KEY_LEN];

/// Errors from key handling and envelope processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("secure random source unavailable: {0}")]
    Randomness(String),
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("base64 decode failed: {0}")]
    Base64Decode(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("envelope authentication failed")]
    Authentication,
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("declared size {declared} does not match plaintext size {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type alias using CryptoError.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Generate a fresh key from the operating system's CSPRNG.
///
/// There is no fallback source: if the OS cannot provide randomness the
/// caller gets [`CryptoError::Randomness`].
pub fn generate_key() -> CryptoResult<KeyBytes> {
    let mut key = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| CryptoError::Randomness(e.to_string()))?;
    Ok(key)
}

/// Encode a key for storage.
pub fn encode_key(key: &KeyBytes) -> String {
    BASE64.encode(key)
}

/// Decode a stored key, enforcing the cipher's key size.
pub fn decode_key(encoded: &str) -> CryptoResult<KeyBytes> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Base64Decode(e.to_string()))?;
    KeyBytes::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn key_encoding_roundtrip() {
        let key = generate_key().unwrap();
        let encoded = encode_key(&key);
        assert_eq!(encoded.len(), 32);
        assert_eq!(decode_key(&encoded).unwrap(), key);
    }

    #[test]
    fn decode_key_rejects_wrong_length() {
        let short = BASE64.encode([7u8; 16]);
        assert_eq!(
            decode_key(&short),
            Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: 16
            })
        );
    }

    #[test]
    fn decode_key_rejects_garbage() {
        assert!(matches!(
            decode_key("not base64!!"),
            Err(CryptoError::Base64Decode(_))
        ));
    }
}
