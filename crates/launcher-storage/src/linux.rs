//! Linux Secret Service adapter.

use crate::{SecureStorage, StorageError, StorageResult};
use secret_service::blocking::{Collection, SecretService};
use secret_service::EncryptionType;
use std::collections::HashMap;
use tracing::debug;

/// Items in the default Secret Service collection, tagged with
/// `service` and `key` attributes.
pub struct SecretServiceStorage {
    service_name: String,
}

fn platform(e: impl std::fmt::Display) -> StorageError {
    StorageError::Platform(e.to_string())
}

impl SecretServiceStorage {
    /// Connects once up front so an unavailable D-Bus service fails early.
    pub fn new(service_name: &str) -> StorageResult<Self> {
        SecretService::connect(EncryptionType::Dh).map_err(|e| {
            StorageError::Platform(format!("Failed to connect to Secret Service: {}", e))
        })?;

        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn with_collection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Collection) -> StorageResult<T>,
    {
        let ss = SecretService::connect(EncryptionType::Dh).map_err(platform)?;
        let collection = ss.get_default_collection().map_err(platform)?;

        if collection.is_locked().unwrap_or(false) {
            collection.unlock().map_err(|e| {
                StorageError::Platform(format!("Failed to unlock collection: {}", e))
            })?;
        }

        f(&collection)
    }

    fn attributes<'a>(&'a self, key: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("service", self.service_name.as_str()), ("key", key)])
    }
}

impl SecureStorage for SecretServiceStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing secret");

        self.with_collection(|collection| {
            let label = format!("{}/{}", self.service_name, key);
            collection
                .create_item(&label, self.attributes(key), value.as_bytes(), true, "text/plain")
                .map_err(platform)?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Reading secret");

        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            let Some(item) = items.first() else {
                return Ok(None);
            };
            let secret = item.get_secret().map_err(platform)?;
            String::from_utf8(secret)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string()))
        })
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting secret");

        self.with_collection(|collection| {
            let items = collection.search_items(self.attributes(key)).map_err(platform)?;
            let Some(item) = items.first() else {
                return Ok(false);
            };
            item.delete().map_err(platform)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "org.oplauncher.host.test";

    #[test]
    #[ignore] // Requires Linux Secret Service (D-Bus)
    fn test_secret_service_token_entries() {
        let storage = SecretServiceStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.delete("UDate");

        storage.set("UDate", "20260101").unwrap();
        storage.set("UDate", "20260202").unwrap();
        assert_eq!(storage.get("UDate").unwrap(), Some("20260202".to_string()));

        assert!(storage.has("UDate").unwrap());
        assert!(storage.delete("UDate").unwrap());
        assert_eq!(storage.get("UDate").unwrap(), None);
    }
}
