//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionManager
//!     → preferences.rs (mode tag, serialized remote config)
//!     → credentials.rs (management key per config id: keyring, or file fallback)
//!     → json_file.rs (atomic write of a flat JSON map)
//!
//! another process rewrites preferences.json
//!     → watcher.rs (notify on the data dir)
//!     → ConnectionManager::reload_persisted
//! ```
//!
//! # Design Decisions
//! - Both stores are traits so front ends can swap in platform backends
//! - Secrets never share a file with preferences
//! - Store errors are reported to the caller; the manager decides whether they matter

pub mod credentials;
pub(crate) mod json_file;
pub mod preferences;
pub mod watcher;

use thiserror::Error;

pub use credentials::{CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use preferences::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
pub use watcher::PreferencesWatcher;

/// Errors raised by the persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage format error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}
