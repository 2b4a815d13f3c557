//! Connection resilience for a local or remote API proxy.
//!
//! Tracks whether the application targets a local or remote proxy, supervises
//! reconnection with exponential backoff, and locks out reconnect attempts
//! after repeated failures.

pub mod config;
pub mod connection;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod resilience;
pub mod storage;
pub mod supervisor;

pub use config::AppConfig;
pub use connection::{ConnectionManager, ConnectionMode, ConnectionStatus, RemoteConnectionConfig};
pub use lifecycle::Shutdown;
pub use supervisor::Supervisor;
