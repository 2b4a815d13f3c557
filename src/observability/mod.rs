//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (subscriber: env filter + text or JSON formatter)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Management keys are never logged

pub mod logging;

pub use logging::init_logging;
