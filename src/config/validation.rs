//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, buffers > 0)
//! - Detect the two listeners colliding on one address
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: BridgeConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::observability::logging::LOG_LEVELS;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check `config` for values serde accepts but the bridge cannot run with.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.host.trim().is_empty() {
        errors.push(ValidationError::new("http.host", "must not be empty"));
    }
    if config.channel.host.trim().is_empty() {
        errors.push(ValidationError::new("channel.host", "must not be empty"));
    }
    if config.http.max_body_size == 0 {
        errors.push(ValidationError::new("http.max_body_size", "must be greater than 0"));
    }
    if config.channel.outbound_buffer == 0 {
        errors.push(ValidationError::new("channel.outbound_buffer", "must be greater than 0"));
    }
    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }

    // Port 0 asks the OS for an ephemeral port, so it never collides.
    if config.http.port != 0
        && config.http.port == config.channel.port
        && config.http.host == config.channel.host
    {
        errors.push(ValidationError::new(
            "channel.port",
            format!(
                "conflicts with the HTTP listener on {}",
                config.http.bind_address()
            ),
        ));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!(
                "unknown level '{}', expected one of {}",
                config.observability.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
