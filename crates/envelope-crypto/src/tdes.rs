//! 3DES-EDE3 in ECB mode with PKCS#7 padding.

use crate::{CryptoError, CryptoResult, KeyBytes};
use cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use des::TdesEde3;

type TdesEcbEnc = ecb::Encryptor<TdesEde3>;
type TdesEcbDec = ecb::Decryptor<TdesEde3>;

fn key_error(key: &KeyBytes) -> CryptoError {
    CryptoError::InvalidKeyLength {
        expected: crate::KEY_LEN,
        actual: key.len(),
    }
}

pub(crate) fn encrypt(key: &KeyBytes, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = TdesEcbEnc::new_from_slice(key).map_err(|_| key_error(key))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub(crate) fn decrypt(key: &KeyBytes, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 8 != 0 {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext length {} is not a whole number of blocks",
            ciphertext.len()
        )));
    }
    let cipher = TdesEcbDec::new_from_slice(key).map_err(|_| key_error(key))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("invalid padding".to_string()))
}
