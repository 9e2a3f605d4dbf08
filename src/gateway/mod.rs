//! Gate server: the front door in front of the shell server.
//!
//! # Data Flow
//! ```text
//! Listener::accept (bounded by max_connections)
//!     → ConnectionGate::on_accept (raw peer; reject = close, no bytes)
//!     → resolve.rs (PROXY v2 header, if enabled)
//!     → ConnectionGate::on_proxy_resolved (resolved client)
//!     → login.rs (login:/password: prompts)
//!     → AuthenticationGate (failures counted; block = notice + close)
//!     → upstream.rs (connect, optional PROXY header, bidirectional copy)
//! ```
//!
//! # Design Decisions
//! - One task per connection; the deny list is the only shared mutable state
//! - Bytes read past the PROXY header belong to the login exchange, and bytes
//!   read past the last login line are forwarded upstream
//! - Reloadable settings are read once per connection from an `ArcSwap`

pub mod login;
pub mod resolve;
pub mod server;
pub mod upstream;

pub use server::GateServer;
