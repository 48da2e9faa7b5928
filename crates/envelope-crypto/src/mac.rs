//! Envelope authenticity tag.

use crate::{CryptoError, CryptoResult, KeyBytes};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MAC_KEY_INFO: &[u8] = b"oplauncher-envelope-mac-v1";

/// HMAC key derived from the cipher key.
fn derive_mac_key(key: &KeyBytes) -> CryptoResult<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, key);
    let mut okm = [0u8; 32];
    hk.expand(MAC_KEY_INFO, &mut okm)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("mac key derivation: {e}")))?;
    Ok(okm)
}

fn keyed(key: &KeyBytes) -> CryptoResult<HmacSha256> {
    let mac_key = derive_mac_key(key)?;
    <HmacSha256 as Mac>::new_from_slice(&mac_key)
        .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
}

pub(crate) fn tag(key: &KeyBytes, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut mac = keyed(key)?;
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of `expected` against the ciphertext.
pub(crate) fn verify(key: &KeyBytes, ciphertext: &[u8], expected: &[u8]) -> CryptoResult<()> {
    let mut mac = keyed(key)?;
    mac.update(ciphertext);
    mac.verify_slice(expected)
        .map_err(|_| CryptoError::Authentication)
}
