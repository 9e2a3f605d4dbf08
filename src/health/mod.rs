//! Health socket subsystem.
//!
//! # Data Flow
//! ```text
//! Load balancer probe
//!     → server.rs (separate port, no gate, no deny list)
//!     → "OK\n", close
//! ```
//!
//! # Design Decisions
//! - Probes never touch the gated port, so a balancer can never be deny-listed
//! - The socket only answers; it reports no internal state

pub mod server;

pub use server::HealthServer;
