//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds and windows > 0, addresses parse)
//! - Check the selected credential store is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{AuthMode, GateConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
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

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.proxy_protocol.enabled && config.proxy_protocol.header_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "proxy_protocol.header_timeout_ms",
            "must be greater than 0",
        ));
    }

    let brute_force = &config.brute_force;
    if brute_force.max_fails == 0 {
        errors.push(ValidationError::new("brute_force.max_fails", "must be at least 1"));
    }
    if brute_force.capacity == 0 {
        errors.push(ValidationError::new("brute_force.capacity", "must be greater than 0"));
    }
    if brute_force.idle_secs == 0 {
        errors.push(ValidationError::new("brute_force.idle_secs", "must be greater than 0"));
    }
    if brute_force.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "brute_force.sweep_interval_secs",
            "must be greater than 0",
        ));
    }

    let auth = &config.auth;
    match auth.mode {
        AuthMode::Simple => {
            if auth.username.is_empty() {
                errors.push(ValidationError::new("auth.username", "required in simple mode"));
            }
            if auth.password.is_empty() {
                errors.push(ValidationError::new("auth.password", "required in simple mode"));
            }
        }
        AuthMode::PasswordFile => {
            if auth.password_file.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "auth.password_file",
                    "required in password_file mode",
                ));
            }
        }
    }
    if auth.max_attempts == 0 {
        errors.push(ValidationError::new("auth.max_attempts", "must be at least 1"));
    }
    if auth.login_timeout_secs == 0 {
        errors.push(ValidationError::new("auth.login_timeout_secs", "must be greater than 0"));
    }

    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.connect_timeout_secs", "must be greater than 0"));
    }

    if config.health.enabled {
        check_address(&mut errors, "health.bind_address", &config.health.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
    }
}
