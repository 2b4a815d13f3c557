//! Connection probing.
//!
//! # Data Flow
//! ```text
//! ProbeTarget (local settings or remote config + key)
//!     → client.rs (GET management config with bearer key)
//!     → Ok / ProbeError
//!     → caller reports outcome to the ConnectionManager
//! ```
//!
//! # Design Decisions
//! - Every request carries the target's own timeout
//! - TLS verification can be disabled per remote config, never for local
//! - Error text keeps the full source chain so classification can see it

pub mod client;

pub use client::{ManagementClient, ProbeError, ProbeTarget};
