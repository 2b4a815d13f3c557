//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the TOML settings file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the connection manager and its front ends.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Where mode, remote config and credentials are persisted.
    pub storage: StorageConfig,

    /// Reconnect backoff settings.
    pub reconnect: ReconnectConfig,

    /// Lockout after repeated failures.
    pub auth_ban: AuthBanConfig,

    /// Locally hosted proxy instance.
    pub local: LocalProxyConfig,

    /// Background reconnect loop.
    pub supervisor: SupervisorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Storage locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the preference and credential files.
    pub data_dir: PathBuf,

    /// File name of the mode/remote-config preferences (JSON).
    pub preferences_file: String,

    /// Where management keys are kept.
    pub credential_backend: CredentialBackend,

    /// File name of the management key store when the file backend is
    /// selected (JSON, owner-only).
    pub credentials_file: String,

    /// File name of the status document the daemon publishes for the CLI.
    pub status_file: String,
}

/// Management key storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// Platform keyring (Keychain, Credential Manager, kernel keyring).
    #[default]
    Keyring,
    /// Owner-readable JSON file in `data_dir`. For hosts without a keyring.
    File,
}

impl StorageConfig {
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(&self.preferences_file)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(&self.credentials_file)
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(&self.status_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            preferences_file: "preferences.json".to_string(),
            credential_backend: CredentialBackend::Keyring,
            credentials_file: "credentials.json".to_string(),
            status_file: "status.json".to_string(),
        }
    }
}

/// Platform config directory, or the working directory if none is known.
pub fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("proxy-connect"))
        .unwrap_or_else(|| PathBuf::from(".proxy-connect"))
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in seconds.
    pub base_delay_secs: u64,

    /// Upper bound for any single delay, in seconds.
    pub max_delay_secs: u64,

    /// Exponent stops growing after this many doublings.
    pub cap_index: u32,

    /// Auto-reconnect stops at this many consecutive failures.
    pub max_consecutive_failures: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 2,
            max_delay_secs: 30,
            cap_index: 4,
            max_consecutive_failures: 10,
        }
    }
}

/// Auth ban configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthBanConfig {
    /// Consecutive failures that start a ban.
    pub failure_threshold: u32,

    /// Ban length in seconds.
    pub duration_secs: u64,
}

impl Default for AuthBanConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            duration_secs: 30 * 60,
        }
    }
}

/// Local proxy endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalProxyConfig {
    /// Base URL of the local management API.
    pub endpoint_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Management key of the local proxy, if it requires one.
    pub management_key: Option<String>,
}

impl Default for LocalProxyConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8317".to_string(),
            timeout_secs: 10,
            management_key: None,
        }
    }
}

/// Supervisor loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interval between keep-alive probes while connected, in seconds.
    pub keepalive_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("[reconnect]\nbase_delay_secs = 1\n").unwrap();
        assert_eq!(config.reconnect.base_delay_secs, 1);
        assert_eq!(config.reconnect.max_delay_secs, 30);
        assert_eq!(config.auth_ban.failure_threshold, 5);
        assert_eq!(config.auth_ban.duration_secs, 1800);
        assert_eq!(config.storage.preferences_file, "preferences.json");
        assert_eq!(config.storage.credential_backend, CredentialBackend::Keyring);
    }

    #[test]
    fn test_file_credential_backend() {
        let config: AppConfig = toml::from_str("[storage]\ncredential_backend = \"file\"\n").unwrap();
        assert_eq!(config.storage.credential_backend, CredentialBackend::File);
        assert!(toml::from_str::<AppConfig>("[storage]\ncredential_backend = \"vault\"\n").is_err());
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/pc"),
            ..Default::default()
        };
        assert_eq!(storage.preferences_path(), PathBuf::from("/tmp/pc/preferences.json"));
        assert_eq!(storage.credentials_path(), PathBuf::from("/tmp/pc/credentials.json"));
        assert_eq!(storage.status_path(), PathBuf::from("/tmp/pc/status.json"));
    }
}
