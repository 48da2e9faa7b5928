//! macOS Keychain adapter.

use crate::{SecureStorage, StorageError, StorageResult};
use security_framework::item::{ItemClass, ItemSearchOptions, Limit, SearchResult};
use security_framework::passwords::{delete_generic_password, set_generic_password};
use tracing::debug;

/// errSecItemNotFound
const ITEM_NOT_FOUND: &str = "-25300";

/// Generic-password items under one Keychain service.
pub struct KeychainStorage {
    service_name: String,
}

impl KeychainStorage {
    pub fn new(service_name: &str) -> StorageResult<Self> {
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    fn is_not_found(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("not found") || lower.contains("could not be found") || message.contains(ITEM_NOT_FOUND)
    }
}

impl SecureStorage for KeychainStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        debug!(service = %self.service_name, key = %key, "Writing keychain item");

        let _ = delete_generic_password(&self.service_name, key);
        set_generic_password(&self.service_name, key, value.as_bytes())
            .map_err(|e| StorageError::Platform(format!("Failed to set keychain item: {}", e)))
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        debug!(service = %self.service_name, key = %key, "Reading keychain item");

        let mut search = ItemSearchOptions::new();
        search
            .class(ItemClass::generic_password())
            .service(&self.service_name)
            .account(key)
            .limit(Limit::Max(1))
            .load_data(true);

        let results = match search.search() {
            Ok(results) => results,
            Err(e) if Self::is_not_found(&e.to_string()) => return Ok(None),
            Err(e) => {
                return Err(StorageError::Platform(format!(
                    "Failed to get keychain item: {}",
                    e
                )))
            }
        };

        match results.into_iter().next() {
            Some(SearchResult::Data(data)) => String::from_utf8(data)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            _ => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain item");

        match delete_generic_password(&self.service_name, key) {
            Ok(()) => Ok(true),
            Err(e) if Self::is_not_found(&e.to_string()) => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete keychain item: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SERVICE: &str = "org.oplauncher.host.test";

    #[test]
    #[ignore] // Requires macOS Keychain access
    fn test_keychain_token_entries() {
        let storage = KeychainStorage::new(TEST_SERVICE).unwrap();
        let _ = storage.delete("Token");

        storage.set("Token", "AAAA").unwrap();
        storage.set("Token", "BBBB").unwrap();
        assert_eq!(storage.get("Token").unwrap(), Some("BBBB".to_string()));

        assert!(storage.delete("Token").unwrap());
        assert!(!storage.delete("Token").unwrap());
        assert_eq!(storage.get("Token").unwrap(), None);
    }
}
