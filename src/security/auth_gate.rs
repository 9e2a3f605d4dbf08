//! Brute-force tracking around an external credential check.
//!
//! # Responsibilities
//! - Delegate the credential check unchanged
//! - Count failures per resolved client address in the deny list
//! - Close the session and report `Blocked` once `max_fails` is reached
//!
//! # Design Decisions
//! - The increment and the threshold comparison use the value returned by a
//!   single atomic `record_failure`, so concurrent failures from one address
//!   cannot both observe a sub-threshold count
//! - Loopback clients are never counted
//! - A successful login leaves the counter alone; only idle expiry or
//!   eviction forgets past failures

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::deny_list::DenyList;
use crate::auth::{Authenticator, Credentials};
use crate::net::Session;
use crate::observability::metrics;

/// Default number of failures before a client is blocked.
pub const DEFAULT_MAX_FAILS: u32 = 1;

/// The client crossed the failure threshold; its session has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client {address} blocked after {failures} failed authentication attempts")]
pub struct Blocked {
    pub address: IpAddr,
    pub failures: u8,
}

/// Decorator that adds deny-list tracking to an [`Authenticator`].
pub struct AuthenticationGate<A> {
    delegate: A,
    deny_list: Arc<DenyList>,
    max_fails: AtomicU32,
}

impl<A: Authenticator> AuthenticationGate<A> {
    pub fn new(delegate: A, deny_list: Arc<DenyList>) -> Self {
        Self {
            delegate,
            deny_list,
            max_fails: AtomicU32::new(DEFAULT_MAX_FAILS),
        }
    }

    pub fn with_max_fails(self, max_fails: u32) -> Self {
        self.set_max_fails(max_fails);
        self
    }

    pub fn max_fails(&self) -> u32 {
        self.max_fails.load(Ordering::Relaxed)
    }

    /// Adjust the threshold at runtime (config reload).
    pub fn set_max_fails(&self, max_fails: u32) {
        self.max_fails.store(max_fails.max(1), Ordering::Relaxed);
    }

    /// Run the delegate check and track the outcome.
    ///
    /// Returns the delegate's verdict, or `Blocked` when this failure reached
    /// the threshold. A blocked session has already been closed.
    pub fn authenticate(&self, credentials: &Credentials, session: &Session) -> Result<bool, Blocked> {
        if self.delegate.authenticate(credentials, session) {
            return Ok(true);
        }

        let address = session.client_addr().ip();
        let Some(failures) = self.deny_list.record_failure(address) else {
            tracing::debug!(
                connection_id = %session.id(),
                %address,
                "Authentication failed from loopback; not tracked"
            );
            return Ok(false);
        };

        metrics::record_auth_failure();
        tracing::info!(
            connection_id = %session.id(),
            %address,
            username = %credentials.username,
            attempt = failures,
            "Authentication attempt failed"
        );

        if u32::from(failures) >= self.max_fails() {
            tracing::info!(
                connection_id = %session.id(),
                %address,
                username = %credentials.username,
                attempts = failures,
                "Authentication blocked"
            );
            metrics::record_session_blocked();
            session.close();
            return Err(Blocked { address, failures });
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthenticator;
    use std::net::SocketAddr;
    use std::sync::Barrier;
    use std::time::Duration;

    fn deny_list() -> Arc<DenyList> {
        Arc::new(DenyList::new(5000, 0, Duration::from_secs(86_400)))
    }

    fn gate(deny_list: &Arc<DenyList>) -> AuthenticationGate<StaticAuthenticator> {
        AuthenticationGate::new(StaticAuthenticator::new("user", "secret"), Arc::clone(deny_list))
    }

    fn session(addr: &str) -> Session {
        Session::new(addr.parse().unwrap())
    }

    fn bad() -> Credentials {
        Credentials::new("user", "wrong")
    }

    #[test]
    fn single_failure_blocks_with_default_threshold() {
        let list = deny_list();
        let gate = gate(&list);
        let session = session("198.51.100.7:50022");

        let result = gate.authenticate(&bad(), &session);

        assert_eq!(
            result,
            Err(Blocked {
                address: "198.51.100.7".parse().unwrap(),
                failures: 1
            })
        );
        assert_eq!(list.get(&"198.51.100.7".parse().unwrap()), Some(1));
        assert!(session.is_closed());
    }

    #[test]
    fn success_passes_through_without_tracking() {
        let list = deny_list();
        let gate = gate(&list);
        let session = session("198.51.100.7:50022");

        assert_eq!(gate.authenticate(&Credentials::new("user", "secret"), &session), Ok(true));
        assert!(list.is_empty());
        assert!(!session.is_closed());
    }

    #[test]
    fn failures_below_threshold_are_ordinary() {
        let list = deny_list();
        let gate = gate(&list).with_max_fails(3);
        let session = session("198.51.100.7:50022");

        assert_eq!(gate.authenticate(&bad(), &session), Ok(false));
        assert_eq!(gate.authenticate(&bad(), &session), Ok(false));
        assert!(!session.is_closed());
        assert!(gate.authenticate(&bad(), &session).is_err());
        assert!(session.is_closed());
    }

    #[test]
    fn success_does_not_reset_counter() {
        let list = deny_list();
        let gate = gate(&list).with_max_fails(2);
        let addr = "198.51.100.7:50022";

        assert_eq!(gate.authenticate(&bad(), &session(addr)), Ok(false));
        assert_eq!(gate.authenticate(&Credentials::new("user", "secret"), &session(addr)), Ok(true));
        assert!(gate.authenticate(&bad(), &session(addr)).is_err());
    }

    #[test]
    fn loopback_is_never_blocked() {
        let list = deny_list();
        let gate = gate(&list);

        for addr in ["127.0.0.1:40000", "[::1]:40000"] {
            let session = session(addr);
            assert_eq!(gate.authenticate(&bad(), &session), Ok(false));
            assert!(!session.is_closed());
        }
        assert!(list.is_empty());
    }

    #[test]
    fn tracks_proxy_resolved_address() {
        let list = deny_list();
        let gate = gate(&list);
        let session = session("10.0.0.2:61000");
        let client: SocketAddr = "203.0.113.9:4422".parse().unwrap();
        session.set_client_addr(client);

        assert!(gate.authenticate(&bad(), &session).is_err());
        assert!(list.contains(&client.ip()));
        assert!(!list.contains(&"10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn concurrent_failures_block_exactly_once_at_threshold() {
        let list = deny_list();
        let gate = gate(&list).with_max_fails(2);
        let barrier = Barrier::new(2);

        let results: Vec<Result<bool, Blocked>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        let session = session("198.51.100.7:50022");
                        barrier.wait();
                        gate.authenticate(&bad(), &session)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(results.iter().filter(|r| **r == Ok(false)).count(), 1);
    }

    #[test]
    fn threshold_is_adjustable_at_runtime() {
        let list = deny_list();
        let gate = gate(&list).with_max_fails(5);
        assert_eq!(gate.authenticate(&bad(), &session("192.0.2.1:1")), Ok(false));

        gate.set_max_fails(2);
        assert_eq!(gate.max_fails(), 2);
        assert!(gate.authenticate(&bad(), &session("192.0.2.1:1")).is_err());
    }
}
