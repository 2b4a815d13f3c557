//! Management key storage.
//!
//! # Responsibilities
//! - Keep one secret per remote config, keyed by the config's stable id
//! - Overwrite on save (delete-then-add semantics)
//! - Never sync secrets off the host
//!
//! # Design Decisions
//! - Lookups use the config id, never the URL or display name
//! - The platform keyring is the durable default; it only hands secrets out
//!   while the user session is unlocked
//! - File backend is an explicit opt-in, owner-readable only, in the local data dir

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

use crate::storage::json_file::{read_map, read_map_for_update, write_map};
use crate::storage::StoreError;

/// Service label stored alongside every entry.
pub const CREDENTIAL_SERVICE: &str = "proxy-connect.remote-management";

/// Account name under which a config's key is stored.
pub fn account_name(config_id: &str) -> String {
    format!("management-key-{config_id}")
}

/// Durable, keyed storage for remote management keys.
pub trait CredentialStore: Send + Sync {
    /// Store `key` for `config_id`, replacing any previous entry.
    fn save(&self, config_id: &str, key: &str) -> Result<(), StoreError>;

    fn get(&self, config_id: &str) -> Result<Option<String>, StoreError>;

    /// Remove the entry; absent entries are not an error.
    fn delete(&self, config_id: &str) -> Result<(), StoreError>;

    fn has(&self, config_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(config_id)?.is_some())
    }
}

/// Process-local store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, config_id: &str, key: &str) -> Result<(), StoreError> {
        let account = account_name(config_id);
        self.entries.remove(&account);
        self.entries.insert(account, key.to_string());
        Ok(())
    }

    fn get(&self, config_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .get(&account_name(config_id))
            .map(|r| r.value().clone()))
    }

    fn delete(&self, config_id: &str) -> Result<(), StoreError> {
        self.entries.remove(&account_name(config_id));
        Ok(())
    }
}

/// Store backed by the platform keyring, one entry per config under
/// [`CREDENTIAL_SERVICE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(config_id: &str) -> Result<keyring::Entry, StoreError> {
        Ok(keyring::Entry::new(CREDENTIAL_SERVICE, &account_name(config_id))?)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save(&self, config_id: &str, key: &str) -> Result<(), StoreError> {
        Self::entry(config_id)?.set_password(key)?;
        tracing::debug!(config_id, "Saved management key to keyring");
        Ok(())
    }

    fn get(&self, config_id: &str) -> Result<Option<String>, StoreError> {
        match Self::entry(config_id)?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, config_id: &str) -> Result<(), StoreError> {
        match Self::entry(config_id)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(config_id, "Deleted management key from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// JSON file store with owner-only permissions.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn service_key(account: &str) -> String {
        format!("{CREDENTIAL_SERVICE}/{account}")
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, config_id: &str, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map_for_update(&self.path, "credentials")?;
        let entry = Self::service_key(&account_name(config_id));
        map.remove(&entry);
        map.insert(entry, key.to_string());
        write_map(&self.path, &map, true)?;
        tracing::debug!(config_id, "Saved management key");
        Ok(())
    }

    fn get(&self, config_id: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map(&self.path)?;
        Ok(map.remove(&Self::service_key(&account_name(config_id))))
    }

    fn delete(&self, config_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map(&self.path)?;
        if map.remove(&Self::service_key(&account_name(config_id))).is_some() {
            write_map(&self.path, &map, true)?;
            tracing::debug!(config_id, "Deleted management key");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn CredentialStore) {
        assert!(!store.has("cfg-1").unwrap());
        store.save("cfg-1", "first").unwrap();
        store.save("cfg-1", "second").unwrap();
        store.save("cfg-2", "other").unwrap();
        assert_eq!(store.get("cfg-1").unwrap().as_deref(), Some("second"));
        assert!(store.has("cfg-2").unwrap());

        store.delete("cfg-1").unwrap();
        store.delete("cfg-1").unwrap();
        assert_eq!(store.get("cfg-1").unwrap(), None);
        assert_eq!(store.get("cfg-2").unwrap().as_deref(), Some("other"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        exercise(&FileCredentialStore::new(&path));

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get("cfg-2").unwrap().as_deref(), Some("other"));
    }

    #[test]
    fn test_corrupt_file_does_not_block_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(store.get("cfg-1").is_err());
        store.save("cfg-1", "fresh").unwrap();
        assert_eq!(store.get("cfg-1").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_keyring_missing_entry_is_absent() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringCredentialStore::new();

        assert_eq!(store.get("cfg-missing").unwrap(), None);
        assert!(!store.has("cfg-missing").unwrap());
        store.delete("cfg-missing").unwrap();
        store.save("cfg-1", "secret").unwrap();
    }

    #[test]
    fn test_account_name() {
        assert_eq!(account_name("abc"), "management-key-abc");
    }
}
