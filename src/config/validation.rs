//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, thresholds > 0)
//! - Check that the local endpoint is a usable URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("reconnect.base_delay_secs must be greater than 0")]
    ZeroBaseDelay,

    #[error("reconnect.max_delay_secs ({max}) must be >= base_delay_secs ({base})")]
    MaxBelowBase { base: u64, max: u64 },

    #[error("reconnect.max_consecutive_failures must be greater than 0")]
    ZeroFailureLimit,

    #[error("auth_ban.failure_threshold must be greater than 0")]
    ZeroBanThreshold,

    #[error("auth_ban.duration_secs must be greater than 0")]
    ZeroBanDuration,

    #[error("local.endpoint_url is invalid: {0}")]
    InvalidLocalUrl(String),

    #[error("supervisor.keepalive_interval_secs must be greater than 0")]
    ZeroKeepalive,
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let reconnect = &config.reconnect;
    if reconnect.base_delay_secs == 0 {
        errors.push(ValidationError::ZeroBaseDelay);
    }
    if reconnect.max_delay_secs < reconnect.base_delay_secs {
        errors.push(ValidationError::MaxBelowBase {
            base: reconnect.base_delay_secs,
            max: reconnect.max_delay_secs,
        });
    }
    if reconnect.max_consecutive_failures == 0 {
        errors.push(ValidationError::ZeroFailureLimit);
    }

    if config.auth_ban.failure_threshold == 0 {
        errors.push(ValidationError::ZeroBanThreshold);
    }
    if config.auth_ban.duration_secs == 0 {
        errors.push(ValidationError::ZeroBanDuration);
    }

    match Url::parse(&config.local.endpoint_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
        Ok(_) => errors.push(ValidationError::InvalidLocalUrl(config.local.endpoint_url.clone())),
        Err(e) => errors.push(ValidationError::InvalidLocalUrl(e.to_string())),
    }

    if config.supervisor.keepalive_interval_secs == 0 {
        errors.push(ValidationError::ZeroKeepalive);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
