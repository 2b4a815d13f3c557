//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → policies, stores and supervisor built from it at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Runtime state (mode, remote endpoint) is NOT here; it lives in `storage`

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::AppConfig;
pub use schema::AuthBanConfig;
pub use schema::CredentialBackend;
pub use schema::LocalProxyConfig;
pub use schema::ObservabilityConfig;
pub use schema::ReconnectConfig;
pub use schema::StorageConfig;
pub use schema::SupervisorConfig;
