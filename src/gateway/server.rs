//! Gate server setup and connection handling.
//!
//! # Responsibilities
//! - Accept connections and apply the raw-peer gate before spawning
//! - Drive each connection through header resolution, login and relay
//! - Apply hot-reloaded configuration
//! - Stop accepting on shutdown and drain live sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::auth::Authenticator;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::gateway::{login, resolve, upstream};
use crate::net::{ConnectionTracker, Listener, ListenerError, Session};
use crate::security::{Admission, AuthenticationGate, ConnectionGate, DenyList, GateStage};

/// How long live sessions may keep running after shutdown begins.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type Gate = AuthenticationGate<Arc<dyn Authenticator>>;

/// State shared by the accept loop and every connection task.
struct Shared {
    config: ArcSwap<GateConfig>,
    connection_gate: ConnectionGate,
    auth_gate: Arc<Gate>,
    tracker: ConnectionTracker,
}

/// Brute-force gate in front of the shell server.
pub struct GateServer {
    shared: Arc<Shared>,
}

impl GateServer {
    pub fn new(
        config: GateConfig,
        deny_list: Arc<DenyList>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let auth_gate = AuthenticationGate::new(authenticator, Arc::clone(&deny_list))
            .with_max_fails(config.brute_force.max_fails);

        Self {
            shared: Arc::new(Shared {
                config: ArcSwap::from_pointee(config),
                connection_gate: ConnectionGate::new(deny_list),
                auth_gate: Arc::new(auth_gate),
                tracker: ConnectionTracker::new(),
            }),
        }
    }

    /// Live session registry.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.shared.tracker
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<GateConfig> {
        self.shared.config.load_full()
    }

    /// Swap in a reloaded configuration.
    ///
    /// Listener, deny-list sizing and credential store changes need a restart.
    pub fn apply_config(&self, config: GateConfig) {
        self.shared.auth_gate.set_max_fails(config.brute_force.max_fails);
        tracing::info!(
            max_fails = config.brute_force.max_fails,
            proxy_protocol = config.proxy_protocol.enabled,
            upstream = %config.upstream.address,
            "Configuration reloaded"
        );
        self.shared.config.store(Arc::new(config));
    }

    /// Run the accept loop until `shutdown` fires, then drain sessions.
    pub async fn run(
        self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), GateError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "Gate server starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    if self.shared.connection_gate.on_accept(peer) == Admission::Reject {
                        drop(stream);
                        continue;
                    }

                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(shared, stream, peer).await;
                    });
                }
                Some(config) = config_updates.recv() => {
                    self.apply_config(config);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        let tracker = &self.shared.tracker;
        if !tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            let closed = tracker.close_all();
            tracing::warn!(closed, "Drain deadline passed, closing remaining sessions");
            tracker.wait_for_drain(Duration::from_secs(1)).await;
        }

        tracing::info!("Gate server stopped");
        Ok(())
    }
}

async fn handle_connection(shared: Arc<Shared>, mut stream: TcpStream, peer: SocketAddr) {
    let session = Arc::new(Session::new(peer));
    let _guard = shared.tracker.track(&session);
    let config = shared.config.load_full();

    // Polled first so a verdict that also closes the session still surfaces.
    let result = tokio::select! {
        biased;
        result = serve(&shared, &config, &session, &mut stream) => result,
        _ = session.closed() => Err(GateError::Closed),
    };
    session.close();

    match result {
        Ok((sent, received)) => tracing::info!(
            connection_id = %session.id(),
            client_addr = %session.client_addr(),
            bytes_to_upstream = sent,
            bytes_to_client = received,
            "Session ended"
        ),
        Err(GateError::Blocked(blocked)) => {
            let _ = stream.write_all(login::BLOCKED_NOTICE).await;
            tracing::debug!(connection_id = %session.id(), address = %blocked.address, "Blocked session closed");
        }
        Err(GateError::Rejected { .. }) => {}
        Err(e) => tracing::debug!(
            connection_id = %session.id(),
            client_addr = %session.client_addr(),
            kind = e.kind(),
            error = %e,
            "Connection ended"
        ),
    }
}

async fn serve(
    shared: &Shared,
    config: &GateConfig,
    session: &Arc<Session>,
    stream: &mut TcpStream,
) -> Result<(u64, u64), GateError> {
    let mut buf = BytesMut::with_capacity(1024);

    if config.proxy_protocol.enabled {
        let timeout = Duration::from_millis(config.proxy_protocol.header_timeout_ms);
        resolve::resolve_client(stream, &mut buf, session, timeout).await?;

        if session.is_proxied()
            && shared.connection_gate.on_proxy_resolved(session.client_addr()) == Admission::Reject
        {
            return Err(GateError::Rejected {
                address: session.client_addr().ip(),
                stage: GateStage::ProxyResolved,
            });
        }
    }

    let login_timeout = Duration::from_secs(config.auth.login_timeout_secs);
    tokio::time::timeout(
        login_timeout,
        authenticate(shared, config, session, stream, &mut buf),
    )
    .await
    .map_err(|_| GateError::LoginTimeout)??;

    let destination = stream.local_addr()?;
    let mut shell = upstream::connect(&config.upstream, session, destination).await?;
    upstream::relay(stream, &mut shell, buf, session).await
}

async fn authenticate(
    shared: &Shared,
    config: &GateConfig,
    session: &Arc<Session>,
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<(), GateError> {
    let attempts = config.auth.max_attempts;
    for _ in 0..attempts {
        let credentials = login::read_credentials(stream, buf).await?;

        let gate = Arc::clone(&shared.auth_gate);
        let checked = Arc::clone(session);
        let verdict = tokio::task::spawn_blocking(move || gate.authenticate(&credentials, &checked))
            .await
            .map_err(std::io::Error::other)?;

        if verdict? {
            tracing::info!(
                connection_id = %session.id(),
                client_addr = %session.client_addr(),
                "Authentication succeeded"
            );
            return Ok(());
        }
        stream.write_all(login::LOGIN_INCORRECT).await?;
    }
    Err(GateError::LoginFailed { attempts })
}
