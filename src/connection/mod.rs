//! Connection resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Front end (CLI / supervisor)
//!     → manager.rs (mode, remote config, status reports)
//!     → storage (preferences + credentials)
//!
//! Error reported:
//!     manager.rs → resilience::auth_ban (count, maybe ban)
//!     front end → schedule_auto_reconnect(action)
//!         → resilience::backoff (delay)
//!         → scheduler.rs (single pending slot)
//!         → action runs, reports outcome back to manager.rs
//! ```
//!
//! # Status State Machine
//! ```text
//! Disconnected → Connecting → Connected
//! Connecting → Error
//! Error → (reconnect fires) → Connecting
//! Error → (schedule refused: ban / failure limit) → Error, counted
//! any → (mode change, manual reconnect, reload of another process's edit) → Disconnected
//! ```

pub mod manager;
mod scheduler;
pub mod types;

pub use manager::{ConnectionManager, ScheduleOutcome};
pub use types::{
    ConnectionMode, ConnectionSnapshot, ConnectionStatus, RemoteConfigUpdate,
    RemoteConnectionConfig,
};
