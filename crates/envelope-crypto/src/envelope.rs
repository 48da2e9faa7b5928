use crate::{mac, tdes, CryptoError, CryptoResult, KeyBytes};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Wire form of an encrypted command.
///
/// `p` and `msz` are accepted as short aliases on input; output always
/// uses the long names. A `mac` is always required, so only senders that
/// compute it can talk to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 ciphertext.
    #[serde(alias = "p")]
    pub payload: String,
    /// Plaintext length in bytes.
    #[serde(alias = "msz")]
    pub msgsize: usize,
    /// Base64 HMAC-SHA256 over the raw ciphertext.
    pub mac: String,
}

impl Envelope {
    pub fn from_json(raw: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(raw).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }
}

/// Encrypt and tag `plaintext` under `key`.
pub fn seal(plaintext: &[u8], key: &KeyBytes) -> CryptoResult<Envelope> {
    let ciphertext = tdes::encrypt(key, plaintext)?;
    let tag = mac::tag(key, &ciphertext)?;
    Ok(Envelope {
        payload: BASE64.encode(&ciphertext),
        msgsize: plaintext.len(),
        mac: BASE64.encode(tag),
    })
}

/// Authenticate, decrypt and validate an envelope.
pub fn open(envelope: &Envelope, key: &KeyBytes) -> CryptoResult<String> {
    let ciphertext = BASE64
        .decode(envelope.payload.trim())
        .map_err(|e| CryptoError::Base64Decode(e.to_string()))?;
    let tag = BASE64
        .decode(envelope.mac.trim())
        .map_err(|e| CryptoError::Base64Decode(e.to_string()))?;

    mac::verify(key, &ciphertext, &tag)?;
    let plaintext = tdes::decrypt(key, &ciphertext)?;

    if plaintext.len() != envelope.msgsize {
        return Err(CryptoError::SizeMismatch {
            declared: envelope.msgsize,
            actual: plaintext.len(),
        });
    }

    debug!(size = plaintext.len(), "Envelope opened");
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

/// Parse raw envelope JSON and open it.
pub fn open_bytes(raw: &[u8], key: &KeyBytes) -> CryptoResult<String> {
    open(&Envelope::from_json(raw)?, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: KeyBytes = *b"abcdefghijklmnopqrstuvwx";
    const COMMAND: &str = r#"{"op":"load","className":"demo.Main"}"#;

    #[test]
    fn seal_then_open() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        assert_eq!(env.msgsize, COMMAND.len());
        assert_eq!(open(&env, &KEY).unwrap(), COMMAND);
    }

    #[test]
    fn open_bytes_accepts_short_field_names() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        let raw = format!(
            r#"{{"p":"{}","msz":{},"mac":"{}","syncresp":false}}"#,
            env.payload, env.msgsize, env.mac
        );
        assert_eq!(open_bytes(raw.as_bytes(), &KEY).unwrap(), COMMAND);
    }

    #[test]
    fn every_flipped_ciphertext_byte_is_rejected() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        let ciphertext = BASE64.decode(&env.payload).unwrap();

        for i in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[i] ^= 0x01;
            let forged = Envelope {
                payload: BASE64.encode(&tampered),
                ..env.clone()
            };
            assert_eq!(
                open(&forged, &KEY),
                Err(CryptoError::Authentication),
                "byte {i}"
            );
        }
    }

    #[test]
    fn wrong_key_rejected() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        let other = *b"xwvutsrqponmlkjihgfedcba";
        assert_eq!(open(&env, &other), Err(CryptoError::Authentication));
    }

    #[test]
    fn declared_size_must_match() {
        let mut env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        env.msgsize += 1;
        assert_eq!(
            open(&env, &KEY),
            Err(CryptoError::SizeMismatch {
                declared: COMMAND.len() + 1,
                actual: COMMAND.len()
            })
        );
    }

    #[test]
    fn missing_mac_is_malformed() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        let raw = format!(r#"{{"payload":"{}","msgsize":{}}}"#, env.payload, env.msgsize);
        assert!(matches!(
            open_bytes(raw.as_bytes(), &KEY),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn short_field_names_still_need_a_mac() {
        let env = seal(COMMAND.as_bytes(), &KEY).unwrap();
        let raw = format!(r#"{{"p":"{}","msz":{}}}"#, env.payload, env.msgsize);
        assert!(matches!(
            open_bytes(raw.as_bytes(), &KEY),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            open_bytes(b"\x00\x01garbage", &KEY),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn bad_base64_payload() {
        let env = Envelope {
            payload: "%%%".to_string(),
            msgsize: 3,
            mac: BASE64.encode([0u8; 32]),
        };
        assert!(matches!(open(&env, &KEY), Err(CryptoError::Base64Decode(_))));
    }

    #[test]
    fn non_utf8_plaintext_rejected() {
        let env = seal(&[0xff, 0xfe, 0xfd], &KEY).unwrap();
        assert_eq!(open(&env, &KEY), Err(CryptoError::InvalidUtf8));
    }
}
