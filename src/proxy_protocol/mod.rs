//! PROXY protocol v2 support.
//!
//! # Data Flow
//! ```text
//! Accepted stream (proxy mode on)
//!     → bytes buffered by the gateway
//!     → decoder.rs (signature, version, command, family, endpoints)
//!     → Decoded::Proxied rewrites the session's client address
//!     → everything else leaves the raw peer address in place
//!
//! Upstream forwarding (optional)
//!     → header.rs encodes the resolved client for the shell server
//! ```

pub mod decoder;
pub mod header;

pub use decoder::{decode, Decoded};
pub use header::ProxyHeader;
