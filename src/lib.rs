//! Brute-force gate for shell servers behind a PROXY v2 load balancer.

// Core
pub mod proxy_protocol;
pub mod security;

// Front door
pub mod auth;
pub mod gateway;
pub mod health;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::GateConfig;
pub use error::GateError;
pub use gateway::GateServer;
pub use lifecycle::Shutdown;
