//! Key/value preference storage for mode and remote endpoint.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

use crate::storage::json_file::{read_map, read_map_for_update, write_map};
use crate::storage::StoreError;

/// Preference key holding the mode tag (`local` / `remote`).
pub const CONNECTION_MODE_KEY: &str = "connectionMode";

/// Preference key holding the serialized remote config.
pub const REMOTE_CONFIG_KEY: &str = "remoteConnectionConfig";

/// Preference key holding the token of the latest manual reconnect request.
pub const RECONNECT_REQUEST_KEY: &str = "reconnectRequest";

/// Durable mapping keyed by fixed string names.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: DashMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Preferences persisted as a JSON object on disk.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(read_map(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map_for_update(&self.path, "preferences")?;
        map.insert(key.to_string(), value.to_string());
        write_map(&self.path, &map, false)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map(&self.path)?;
        if map.remove(key).is_some() {
            write_map(&self.path, &map, false)?;
        }
        Ok(())
    }
}
