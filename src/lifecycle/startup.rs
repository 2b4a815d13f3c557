//! Startup orchestration.

use std::path::Path;

use crate::config::{load_config, load_config_or_default, AppConfig, ConfigError};
use crate::connection::ConnectionManager;

/// Load settings from `path`, or from the default location when `None`.
///
/// An explicit path must exist; the default location may be absent.
pub fn load_settings(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => load_config_or_default(&default_config_path()),
    }
}

pub fn default_config_path() -> std::path::PathBuf {
    crate::config::schema::default_data_dir().join("proxy-connect.toml")
}

/// Build the manager from validated settings.
pub fn build_manager(config: &AppConfig) -> ConnectionManager {
    tracing::info!(
        data_dir = %config.storage.data_dir.display(),
        "Opening connection state"
    );
    ConnectionManager::from_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionMode;

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_build_manager_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        let manager = build_manager(&config);
        manager.set_mode(ConnectionMode::Remote);
        assert!(config.storage.preferences_path().exists());

        let reopened = build_manager(&config);
        assert!(reopened.is_remote_mode());
    }
}
