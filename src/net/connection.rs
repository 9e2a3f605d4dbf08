//! Per-connection session state and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Hold the raw peer address and the once-only resolved client address
//! - Provide an idempotent close signal observable by the connection task
//! - Count live sessions for graceful shutdown

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One accepted connection as seen by the gates.
///
/// The client address starts as the TCP peer and may be replaced exactly
/// once, by a successfully decoded PROXY header.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    resolved_addr: OnceLock<SocketAddr>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub fn new(peer_addr: SocketAddr) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            peer_addr,
            resolved_addr: OnceLock::new(),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the TCP peer (the proxy, when one is in front).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Address used for security decisions.
    pub fn client_addr(&self) -> SocketAddr {
        self.resolved_addr.get().copied().unwrap_or(self.peer_addr)
    }

    /// Whether a PROXY header rewrote the client address.
    pub fn is_proxied(&self) -> bool {
        self.resolved_addr.get().is_some()
    }

    /// Record the client address decoded from a PROXY header.
    ///
    /// Returns `false` if the address was already rewritten.
    pub fn set_client_addr(&self, addr: SocketAddr) -> bool {
        let set = self.resolved_addr.set(addr).is_ok();
        if set {
            tracing::debug!(
                connection_id = %self.id,
                peer_addr = %self.peer_addr,
                client_addr = %addr,
                "Client address resolved from PROXY header"
            );
        }
        set
    }

    /// Forcibly close the session. Safe to call any number of times.
    pub fn close(&self) {
        let was_open = !self.closed.send_replace(true);
        if was_open {
            tracing::debug!(connection_id = %self.id, client_addr = %self.client_addr(), "Session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the session has been closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so the channel cannot be dropped while we wait.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Tracks live sessions for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    sessions: Arc<DashMap<ConnectionId, Arc<Session>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live session. Returns a guard that unregisters it on drop.
    pub fn track(&self, session: &Arc<Session>) -> ConnectionGuard {
        self.sessions.insert(session.id(), Arc::clone(session));
        metrics::record_active_sessions(self.sessions.len() as u64);
        ConnectionGuard {
            sessions: Arc::clone(&self.sessions),
            id: session.id(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.sessions.len() as u64
    }

    /// Close every live session. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.sessions.iter() {
            if !entry.value().is_closed() {
                entry.value().close();
                closed += 1;
            }
        }
        closed
    }

    /// Wait until all connections are closed or the deadline passes.
    ///
    /// Returns `true` if every connection drained in time.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while !self.sessions.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Unregisters the session when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    sessions: Arc<DashMap<ConnectionId, Arc<Session>>>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        metrics::record_active_sessions(self.sessions.len() as u64);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
