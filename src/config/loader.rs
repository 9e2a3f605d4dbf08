//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GateConfig, ConfigError> {
    let config: GateConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AuthMode;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.brute_force.max_fails, 1);
        assert_eq!(config.brute_force.capacity, 5_000);
        assert_eq!(config.brute_force.idle_secs, 86_400);
        assert!(!config.proxy_protocol.enabled);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = parse_config(
            r#"
            [proxy_protocol]
            enabled = true

            [brute_force]
            max_fails = 5

            [auth]
            mode = "simple"
            password = "secret"
            "#,
        )
        .unwrap();

        assert!(config.proxy_protocol.enabled);
        assert_eq!(config.proxy_protocol.header_timeout_ms, 5_000);
        assert_eq!(config.brute_force.max_fails, 5);
        assert_eq!(config.brute_force.capacity, 5_000);
        assert_eq!(config.auth.mode, AuthMode::Simple);
        assert_eq!(config.auth.username, "user");
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(
            parse_config("[brute_force\nmax_fails = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn semantic_errors_are_reported_together() {
        let err = parse_config(
            r#"
            [brute_force]
            max_fails = 0
            idle_secs = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        std::fs::write(&path, "[listener]\nbind_address = \"127.0.0.1:2200\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:2200");
    }
}
