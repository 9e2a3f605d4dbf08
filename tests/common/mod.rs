//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shell_gate::auth::StaticAuthenticator;
use shell_gate::config::{AuthMode, GateConfig};
use shell_gate::net::{ConnectionTracker, Listener};
use shell_gate::proxy_protocol::ProxyHeader;
use shell_gate::security::DenyList;
use shell_gate::{GateError, GateServer, Shutdown};

pub const USERNAME: &str = "operator";
pub const PASSWORD: &str = "correct horse";

/// Start an upstream that echoes every byte back.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Gate config for tests: simple auth, the given upstream, short timeouts.
pub fn test_config(upstream: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.mode = AuthMode::Simple;
    config.auth.username = USERNAME.into();
    config.auth.password = PASSWORD.into();
    config.auth.login_timeout_secs = 5;
    config.upstream.address = upstream.to_string();
    config.upstream.connect_timeout_secs = 1;
    config.proxy_protocol.header_timeout_ms = 1_000;
    config
}

pub struct RunningGate {
    pub addr: SocketAddr,
    pub deny_list: Arc<DenyList>,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<GateConfig>,
    pub handle: JoinHandle<Result<(), GateError>>,
}

/// Run a gate on an ephemeral port.
pub async fn start_gate(config: GateConfig) -> RunningGate {
    let deny_list = Arc::new(DenyList::from_config(&config.brute_force));
    let authenticator = Arc::new(StaticAuthenticator::new(USERNAME, PASSWORD));

    let tcp = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let server = GateServer::new(config, Arc::clone(&deny_list), authenticator);
    let tracker = server.tracker().clone();
    let handle = tokio::spawn(server.run(listener, config_rx, shutdown.subscribe()));

    RunningGate {
        addr,
        deny_list,
        tracker,
        shutdown,
        config_tx,
        handle,
    }
}

/// Encoded PROXY v2 header announcing `source`.
pub fn proxy_header(source: &str, destination: SocketAddr) -> Vec<u8> {
    let mut buf = BytesMut::new();
    ProxyHeader::new(source.parse().unwrap(), destination).encode(&mut buf);
    buf.to_vec()
}

/// Connect and send `payload` in one write.
pub async fn connect_and_send(addr: SocketAddr, payload: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream
}

/// Read exactly `len` bytes, failing the test after a second.
pub async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(1), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for gate output")
        .unwrap();
    buf
}

/// Read until the gate closes the connection. Resets count as a close.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
    assert!(read.is_ok(), "gate did not close the connection");
    buf
}
