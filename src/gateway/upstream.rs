//! Relay of authenticated sessions to the shell server.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::UpstreamConfig;
use crate::error::GateError;
use crate::net::Session;
use crate::proxy_protocol::ProxyHeader;

/// Connect to the shell server, announcing the client first when configured.
///
/// `destination` is the address the client originally connected to.
pub async fn connect(
    config: &UpstreamConfig,
    session: &Session,
    destination: SocketAddr,
) -> Result<TcpStream, GateError> {
    let upstream_err = |source: std::io::Error| GateError::Upstream {
        address: config.address.clone(),
        source,
    };

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&config.address))
        .await
        .map_err(|_| upstream_err(std::io::ErrorKind::TimedOut.into()))?
        .map_err(upstream_err)?;

    if config.send_proxy_header {
        let mut header = BytesMut::new();
        ProxyHeader::new(session.client_addr(), destination).encode(&mut header);
        stream.write_all(&header).await.map_err(upstream_err)?;
    }

    tracing::debug!(
        connection_id = %session.id(),
        upstream = %config.address,
        proxy_header = config.send_proxy_header,
        "Upstream connected"
    );
    Ok(stream)
}

/// Copy bytes both ways until either side closes or the session is closed.
///
/// `pending` holds client bytes already read during login.
pub async fn relay<C, U>(
    client: &mut C,
    upstream: &mut U,
    pending: BytesMut,
    session: &Session,
) -> Result<(u64, u64), GateError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    if !pending.is_empty() {
        upstream.write_all(&pending).await?;
    }

    tokio::select! {
        copied = tokio::io::copy_bidirectional(client, upstream) => {
            let (to_upstream, to_client) = copied?;
            Ok((to_upstream + pending.len() as u64, to_client))
        }
        _ = session.closed() => {
            tracing::debug!(connection_id = %session.id(), "Relay interrupted by session close");
            Ok((pending.len() as u64, 0))
        }
    }
}
