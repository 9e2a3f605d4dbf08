//! Per-connection error type for the gate server.
//!
//! None of these terminate the process; each ends exactly one connection.

use std::io;
use std::net::IpAddr;

use crate::net::ListenerError;
use crate::security::{Blocked, GateStage};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Deny-listed address refused before protocol work.
    #[error("connection from {address} rejected at {stage}")]
    Rejected { address: IpAddr, stage: GateStage },

    /// Failure threshold reached during authentication.
    #[error(transparent)]
    Blocked(#[from] Blocked),

    /// Every login attempt on the connection failed.
    #[error("login failed after {attempts} attempts")]
    LoginFailed { attempts: u32 },

    #[error("timed out waiting for PROXY header")]
    HeaderTimeout,

    #[error("login timed out")]
    LoginTimeout,

    #[error("client line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("client disconnected")]
    Disconnected,

    /// Session closed by the gate, e.g. during shutdown.
    #[error("session closed")]
    Closed,

    #[error("upstream {address} unavailable: {source}")]
    Upstream {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GateError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Rejected { .. } => "rejected",
            GateError::Blocked(_) => "blocked",
            GateError::LoginFailed { .. } => "login_failed",
            GateError::HeaderTimeout => "header_timeout",
            GateError::LoginTimeout => "login_timeout",
            GateError::LineTooLong { .. } => "line_too_long",
            GateError::Disconnected => "disconnected",
            GateError::Closed => "closed",
            GateError::Upstream { .. } => "upstream",
            GateError::Listener(_) => "listener",
            GateError::Io(_) => "io",
        }
    }
}
