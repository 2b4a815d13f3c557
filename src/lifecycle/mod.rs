//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Init logging → Build manager
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Supervisor cancels pending reconnect → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging, then state
//! - Persisted state is written per operation, so shutdown has nothing to flush

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
