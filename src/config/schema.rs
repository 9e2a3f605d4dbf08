//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the connection gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// PROXY protocol v2 handling.
    pub proxy_protocol: ProxyProtocolConfig,

    /// Failure tracking and deny list sizing.
    pub brute_force: BruteForceConfig,

    /// Credential store and login exchange.
    pub auth: AuthConfig,

    /// Shell server that authenticated sessions are relayed to.
    pub upstream: UpstreamConfig,

    /// Plain TCP health socket.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:2222").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2222".to_string(),
            max_connections: 1_024,
        }
    }
}

/// PROXY protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyProtocolConfig {
    /// Expect a PROXY v2 header at the start of every connection.
    pub enabled: bool,

    /// How long to wait for a complete header, in milliseconds.
    pub header_timeout_ms: u64,
}

impl Default for ProxyProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_timeout_ms: 5_000,
        }
    }
}

/// Brute-force protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BruteForceConfig {
    /// Failed authentications before a client is blocked.
    pub max_fails: u32,

    /// Entries kept in the hot tier.
    pub capacity: usize,

    /// Entries kept in the overflow tier once the hot tier is full (0 disables it).
    pub overflow_capacity: usize,

    /// Seconds without access before an entry is forgotten.
    pub idle_secs: u64,

    /// Seconds between expired-entry sweeps.
    pub sweep_interval_secs: u64,

    /// Optional JSON snapshot restored at startup and written at shutdown.
    pub persistence_path: Option<PathBuf>,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            max_fails: 1,
            capacity: 5_000,
            overflow_capacity: 50_000,
            idle_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            persistence_path: None,
        }
    }
}

/// Which credential store backs authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// A single username/password pair from this file.
    Simple,
    /// `username:bcrypt-hash[:roles]` lines from `password_file`.
    PasswordFile,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Username for `simple` mode.
    pub username: String,

    /// Password for `simple` mode.
    pub password: String,

    /// Password database for `password_file` mode.
    pub password_file: PathBuf,

    /// Login attempts allowed on one connection.
    pub max_attempts: u32,

    /// Seconds allowed for the whole login exchange.
    pub login_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::PasswordFile,
            username: "user".to_string(),
            password: String::new(),
            password_file: PathBuf::from("passwords.txt"),
            max_attempts: 3,
            login_timeout_secs: 60,
        }
    }
}

/// Upstream shell server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Shell server address (e.g., "127.0.0.1:2223").
    pub address: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Prefix the relayed stream with a PROXY v2 header carrying the client address.
    pub send_proxy_header: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2223".to_string(),
            connect_timeout_secs: 5,
            send_proxy_header: false,
        }
    }
}

/// Health socket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "0.0.0.0:9000".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
