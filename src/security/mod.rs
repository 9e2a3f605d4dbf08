//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → connection_gate.rs (raw peer deny-listed? reject)
//!     → PROXY header resolved? connection_gate.rs again
//!     → auth_gate.rs (wraps the credential check, counts failures)
//!     → deny_list.rs (shared failure counters)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a deny-listed address never reaches protocol or auth work
//! - The deny list is the only state shared across connections

pub mod auth_gate;
pub mod connection_gate;
pub mod deny_list;

pub use auth_gate::{AuthenticationGate, Blocked, DEFAULT_MAX_FAILS};
pub use connection_gate::{Admission, ConnectionGate, GateStage};
pub use deny_list::{DenyList, DenyListError, DenyListSnapshot, DenyRecord};
