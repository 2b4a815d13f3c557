//! Connection data model.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Which proxy instance the application targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Local,
    Remote,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionMode::Local => "local",
            ConnectionMode::Remote => "remote",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConnectionMode::Local),
            "remote" => Ok(ConnectionMode::Remote),
            other => Err(format!("unknown connection mode '{other}'")),
        }
    }
}

pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Address and settings of a remote proxy.
///
/// Values are immutable: every change yields a new value carrying the same
/// `id`. The `id` scopes the management key in the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConnectionConfig {
    id: String,
    pub endpoint_url: String,
    pub display_name: String,
    pub verify_ssl: bool,
    pub timeout_seconds: u64,
    /// Last successful connection (seconds since epoch).
    pub last_connected: Option<u64>,
}

impl RemoteConnectionConfig {
    /// New config with a freshly generated id.
    pub fn new(endpoint_url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            endpoint_url: endpoint_url.into(),
            display_name: display_name.into(),
            verify_ssl: true,
            timeout_seconds: DEFAULT_REMOTE_TIMEOUT_SECS,
            last_connected: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Non-empty http(s) URL with a host.
    pub fn is_valid(&self) -> bool {
        let trimmed = self.endpoint_url.trim();
        if trimmed.is_empty() {
            return false;
        }
        match Url::parse(trimmed) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Copy with the supplied fields replaced. The id is always kept.
    pub fn updated(&self, update: &RemoteConfigUpdate) -> Self {
        Self {
            id: self.id.clone(),
            endpoint_url: update.endpoint_url.clone().unwrap_or_else(|| self.endpoint_url.clone()),
            display_name: update.display_name.clone().unwrap_or_else(|| self.display_name.clone()),
            verify_ssl: update.verify_ssl.unwrap_or(self.verify_ssl),
            timeout_seconds: update.timeout_seconds.unwrap_or(self.timeout_seconds),
            last_connected: self.last_connected,
        }
    }

    /// Whether both configs reach the same proxy the same way. Display
    /// name and `last_connected` are ignored.
    pub fn same_target(&self, other: &Self) -> bool {
        self.id == other.id
            && self.endpoint_url == other.endpoint_url
            && self.verify_ssl == other.verify_ssl
            && self.timeout_seconds == other.timeout_seconds
    }

    /// Copy with `last_connected` set.
    pub fn connected_at(&self, epoch_secs: u64) -> Self {
        Self {
            last_connected: Some(epoch_secs),
            ..self.clone()
        }
    }
}

/// Partial update of a [`RemoteConnectionConfig`]; `None` keeps the old value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfigUpdate {
    pub endpoint_url: Option<String>,
    pub display_name: Option<String>,
    pub verify_ssl: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

impl RemoteConfigUpdate {
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = Some(verify);
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Current connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Point-in-time view of the manager, published to front ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub mode: ConnectionMode,
    pub remote_config: Option<RemoteConnectionConfig>,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub auth_banned: bool,
    pub auth_ban_remaining_secs: u64,
    pub reconnect_scheduled: bool,
    /// Set when the last write to a store failed.
    pub persistence_warning: Option<String>,
}

pub(crate) fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
