//! Resilience policies for the connection manager.
//!
//! # Data Flow
//! ```text
//! Error reported:
//!     → auth_ban.rs (count failure, enter ban at threshold)
//!     → errors.rs (classify raw message for display)
//!
//! Reconnect requested:
//!     → auth_ban.rs (refuse if banned or over the hard limit)
//!     → backoff.rs (delay for the next attempt)
//! ```
//!
//! # Design Decisions
//! - Policies are pure; all state lives in the manager
//! - No jitter: a single client reconnects to a single proxy
//! - Classification is for display only, never for policy

pub mod auth_ban;
pub mod backoff;
pub mod errors;

pub use auth_ban::AuthBanPolicy;
pub use backoff::BackoffPolicy;
pub use errors::{classify, friendly_error_message, ErrorKind};
