//! Early rejection of deny-listed clients.
//!
//! Consulted twice per connection: once with the raw TCP peer before any
//! bytes are read, and again with the PROXY-resolved client address. The
//! second check is what makes the deny list useful behind a load balancer
//! whose own address is the raw peer for every client.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::deny_list::DenyList;
use crate::observability::metrics;

/// Decision for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Reject,
}

/// Point in the connection setup where the gate ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Accept,
    ProxyResolved,
}

impl GateStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStage::Accept => "accept",
            GateStage::ProxyResolved => "proxy_resolved",
        }
    }
}

impl std::fmt::Display for GateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ConnectionGate {
    deny_list: Arc<DenyList>,
}

impl ConnectionGate {
    pub fn new(deny_list: Arc<DenyList>) -> Self {
        Self { deny_list }
    }

    /// Check the raw TCP peer. Runs before any protocol decoding.
    pub fn on_accept(&self, peer: SocketAddr) -> Admission {
        self.check(peer.ip(), GateStage::Accept)
    }

    /// Check the client address decoded from a PROXY header.
    pub fn on_proxy_resolved(&self, client: SocketAddr) -> Admission {
        self.check(client.ip(), GateStage::ProxyResolved)
    }

    fn check(&self, address: IpAddr, stage: GateStage) -> Admission {
        if self.deny_list.contains(&address) {
            tracing::info!(%address, %stage, "Connection blocked via brute force filter");
            metrics::record_connection_rejected(stage.as_str());
            Admission::Reject
        } else {
            Admission::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate_with(blocked: &[&str]) -> ConnectionGate {
        let deny_list = Arc::new(DenyList::new(100, 0, Duration::from_secs(60)));
        for addr in blocked {
            deny_list.put(addr.parse().unwrap(), 1);
        }
        ConnectionGate::new(deny_list)
    }

    #[test]
    fn rejects_deny_listed_peer() {
        let gate = gate_with(&["198.51.100.7"]);
        assert_eq!(gate.on_accept("198.51.100.7:50000".parse().unwrap()), Admission::Reject);
        assert_eq!(gate.on_accept("198.51.100.8:50000".parse().unwrap()), Admission::Allow);
    }

    #[test]
    fn rejects_resolved_client_behind_allowed_proxy() {
        let gate = gate_with(&["203.0.113.9"]);
        let proxy: SocketAddr = "10.0.0.2:61000".parse().unwrap();
        let client: SocketAddr = "203.0.113.9:4422".parse().unwrap();

        assert_eq!(gate.on_accept(proxy), Admission::Allow);
        assert_eq!(gate.on_proxy_resolved(client), Admission::Reject);
    }
}
