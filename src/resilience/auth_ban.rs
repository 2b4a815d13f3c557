//! Temporary lockout after repeated authentication failures.
//!
//! # State Transitions
//! ```text
//! failures < threshold          → not banned
//! failures reaches threshold    → banned until now + duration
//! Connected reported            → counters and ban cleared (by the manager)
//! failures >= max_failures      → auto-reconnect refused until manual reset
//! ```

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{AuthBanConfig, ReconnectConfig};

/// Decides when connection attempts are forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthBanPolicy {
    failure_threshold: u32,
    duration: Duration,
    max_consecutive_failures: u32,
}

impl AuthBanPolicy {
    pub const fn new(failure_threshold: u32, duration: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            failure_threshold,
            duration,
            max_consecutive_failures,
        }
    }

    pub fn from_config(ban: &AuthBanConfig, reconnect: &ReconnectConfig) -> Self {
        Self::new(
            ban.failure_threshold,
            Duration::from_secs(ban.duration_secs),
            reconnect.max_consecutive_failures,
        )
    }

    /// Ban expiry to install after an error report brought the count to `failures`.
    ///
    /// Only the report that reaches the threshold starts a ban; later reports
    /// leave the existing expiry alone.
    pub fn ban_entry(&self, failures: u32, now: Instant) -> Option<Instant> {
        (failures == self.failure_threshold).then(|| now + self.duration)
    }

    /// True once auto-reconnect must stop until counters are reset explicitly.
    pub fn requires_manual_reset(&self, failures: u32) -> bool {
        failures >= self.max_consecutive_failures
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for AuthBanPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30 * 60), 10)
    }
}

/// `until` is set and still in the future.
pub fn is_banned(now: Instant, until: Option<Instant>) -> bool {
    matches!(until, Some(t) if now < t)
}

/// Time left on the ban, zero when there is none.
pub fn remaining(now: Instant, until: Option<Instant>) -> Duration {
    until.map(|t| t.saturating_duration_since(now)).unwrap_or_default()
}
