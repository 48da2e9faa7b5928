//! Token & key-rotation manager.
//!
//! The active key is either an administrator-supplied override, which is
//! used as-is forever, or a generated key that is replaced once it is older
//! than the configured number of days. The whole read-rotate-write sequence
//! runs under one lock so concurrent callers never both regenerate.

use crate::{SecureStorage, StorageError, StorageKeys};
use chrono::{Local, NaiveDate};
use envelope_crypto::{CryptoError, KeyBytes};
use launcher_config_and_utils::parse_flag;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Storage format of the rotation date.
pub const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Error, Debug)]
pub enum TokenError {
    #[error(transparent)]
    Store(#[from] StorageError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Fixed by configuration, never rotates.
    Override,
    /// Randomly generated, rotates after `max_age_days`.
    Generated,
}

/// A symmetric key plus the metadata needed to decide on rotation.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub key: KeyBytes,
    pub encoded: String,
    pub created_on: NaiveDate,
    pub max_age_days: i64,
    pub kind: TokenKind,
}

impl Token {
    /// Whole days between `created_on` and `today`.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.created_on).num_days()
    }

    /// Generated tokens expire strictly after `max_age_days`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.kind == TokenKind::Generated && self.age_days(today) > self.max_age_days
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("key", &"<redacted>")
            .field("created_on", &self.created_on)
            .field("max_age_days", &self.max_age_days)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Owns the active token, persisted through a [`SecureStorage`].
pub struct TokenManager {
    storage: Arc<dyn SecureStorage>,
    max_age_days: i64,
    rotation: Mutex<()>,
}

impl TokenManager {
    pub fn new(storage: Arc<dyn SecureStorage>, max_age_days: i64) -> Self {
        Self {
            storage,
            max_age_days,
            rotation: Mutex::new(()),
        }
    }

    pub fn max_age_days(&self) -> i64 {
        self.max_age_days
    }

    /// Key that opens control-channel envelopes today.
    pub fn get_active_key(&self) -> TokenResult<KeyBytes> {
        Ok(self.active_token()?.key)
    }

    pub fn active_token(&self) -> TokenResult<Token> {
        self.active_token_on(Local::now().date_naive())
    }

    /// Resolve the active token as of `today`, rotating if needed.
    pub fn active_token_on(&self, today: NaiveDate) -> TokenResult<Token> {
        let _guard = self.rotation.lock();

        if let Some(token) = self.override_token(today)? {
            debug!("Using override token");
            return Ok(token);
        }

        match self.stored_token()? {
            None => {
                info!("No usable stored token, generating one");
                self.rotate(today)
            }
            Some(token) if token.is_expired(today) => {
                info!(
                    age_days = token.age_days(today),
                    max_age_days = self.max_age_days,
                    "Token expired, rotating"
                );
                self.rotate(today)
            }
            Some(token) => Ok(token),
        }
    }

    fn override_token(&self, today: NaiveDate) -> TokenResult<Option<Token>> {
        let enabled = self
            .storage
            .get(StorageKeys::USE_OVERRIDE_TOKEN)?
            .map(|raw| parse_flag(&raw))
            .unwrap_or(false);
        if !enabled {
            return Ok(None);
        }

        let encoded = self
            .storage
            .get(StorageKeys::OVERRIDE_TOKEN)?
            .ok_or_else(|| StorageError::NotFound(StorageKeys::OVERRIDE_TOKEN.to_string()))?;
        let key = envelope_crypto::decode_key(&encoded)?;

        Ok(Some(Token {
            key,
            encoded: encoded.trim().to_string(),
            created_on: today,
            max_age_days: self.max_age_days,
            kind: TokenKind::Override,
        }))
    }

    /// The persisted generated token, or `None` if absent or unreadable.
    fn stored_token(&self) -> TokenResult<Option<Token>> {
        let Some(encoded) = self.storage.get(StorageKeys::TOKEN)? else {
            return Ok(None);
        };
        let Some(raw_date) = self.storage.get(StorageKeys::ROTATION_DATE)? else {
            warn!("Stored token has no rotation date, discarding");
            return Ok(None);
        };

        let key = match envelope_crypto::decode_key(&encoded) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Stored token is unreadable, discarding");
                return Ok(None);
            }
        };
        let created_on = match NaiveDate::parse_from_str(raw_date.trim(), DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                warn!(date = %raw_date, error = %e, "Stored rotation date is unreadable, discarding");
                return Ok(None);
            }
        };

        Ok(Some(Token {
            key,
            encoded,
            created_on,
            max_age_days: self.max_age_days,
            kind: TokenKind::Generated,
        }))
    }

    fn rotate(&self, today: NaiveDate) -> TokenResult<Token> {
        let key = envelope_crypto::generate_key()?;
        let encoded = envelope_crypto::encode_key(&key);

        self.storage.set(StorageKeys::TOKEN, &encoded)?;
        self.storage
            .set(StorageKeys::ROTATION_DATE, &today.format(DATE_FORMAT).to_string())?;
        info!(created_on = %today, "Persisted new token");

        Ok(Token {
            key,
            encoded,
            created_on: today,
            max_age_days: self.max_age_days,
            kind: TokenKind::Generated,
        })
    }
}
