//! Exponential reconnect backoff.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Maps a reconnect attempt number to the wait before that attempt.
///
/// `delay(n) = base * 2^min(n - 1, cap_index)`, clamped to `max_delay`.
/// Deterministic: no jitter is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap_index: u32,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap_index: u32, max_delay: Duration) -> Self {
        Self {
            base,
            cap_index,
            max_delay,
        }
    }

    /// Delay before attempt `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1).saturating_sub(1).min(self.cap_index);
        let factor = 2u32.saturating_pow(exponent);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 4, Duration::from_secs(30))
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_secs(config.base_delay_secs),
            config.cap_index,
            Duration::from_secs(config.max_delay_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_bounds_and_monotonic() {
        let policy = BackoffPolicy::default();
        let mut prev = Duration::ZERO;
        for n in 1..=200 {
            let d = policy.delay(n);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_secs(30));
            assert!(d >= prev);
            prev = d;
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = BackoffPolicy::new(Duration::from_secs(u64::MAX / 2), 10, Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_from_config() {
        let config = ReconnectConfig {
            base_delay_secs: 1,
            max_delay_secs: 5,
            cap_index: 2,
            max_consecutive_failures: 3,
        };
        let policy = BackoffPolicy::from(&config);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(9), Duration::from_secs(4));
    }
}
