//! PROXY header resolution on a live stream.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::GateError;
use crate::net::Session;
use crate::observability::metrics;
use crate::proxy_protocol::{decode, Decoded};

/// Read until the decoder reaches a decision, then apply it to `session`.
///
/// Bytes following the header stay in `buf`. A stream without a header, or
/// with an unusable one, keeps the TCP peer as its client address.
pub async fn resolve_client<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    session: &Session,
    timeout: Duration,
) -> Result<Decoded, GateError>
where
    S: AsyncRead + Unpin,
{
    let decoded = tokio::time::timeout(timeout, read_header(stream, buf))
        .await
        .map_err(|_| GateError::HeaderTimeout)??;

    metrics::record_proxy_header(decoded.label());
    match decoded {
        Decoded::Proxied { source, destination } => {
            session.set_client_addr(source);
            tracing::debug!(
                connection_id = %session.id(),
                %source,
                %destination,
                "PROXY header accepted"
            );
        }
        other => {
            tracing::debug!(
                connection_id = %session.id(),
                peer_addr = %session.peer_addr(),
                outcome = other.label(),
                "No client address from PROXY header"
            );
        }
    }
    Ok(decoded)
}

async fn read_header<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Decoded, GateError>
where
    S: AsyncRead + Unpin,
{
    loop {
        let decoded = decode(buf);
        if decoded.is_complete() {
            return Ok(decoded);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(GateError::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy_protocol::ProxyHeader;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;

    fn session() -> Session {
        Session::new("10.0.0.2:61000".parse().unwrap())
    }

    #[tokio::test]
    async fn header_split_across_reads_resolves_client() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let source: SocketAddr = "203.0.113.9:4422".parse().unwrap();
        let mut wire = BytesMut::new();
        ProxyHeader::new(source, "192.0.2.1:22".parse().unwrap()).encode(&mut wire);
        wire.extend_from_slice(b"alice\n");

        let writer = tokio::spawn(async move {
            client.write_all(&wire[..10]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(&wire[10..]).await.unwrap();
            client
        });

        let session = session();
        let mut buf = BytesMut::new();
        let decoded = resolve_client(&mut server, &mut buf, &session, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(decoded.source(), Some(source));
        assert_eq!(session.client_addr(), source);
        let _client = writer.await.unwrap();
        // Whatever followed the header is left for the login exchange.
        assert!(b"alice\n".starts_with(&buf));
    }

    #[tokio::test]
    async fn plain_stream_keeps_peer_address() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_all(b"hello there, not a header\n").await.unwrap();

        let session = session();
        let mut buf = BytesMut::new();
        let decoded = resolve_client(&mut server, &mut buf, &session, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(decoded, Decoded::NotProxied);
        assert!(!session.is_proxied());
        assert!(buf.starts_with(b"hello there"));
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let mut buf = BytesMut::new();
        let result =
            resolve_client(&mut server, &mut buf, &session(), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(GateError::HeaderTimeout)));
    }

    #[tokio::test]
    async fn short_stream_is_a_disconnect() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"\r\n\r\n").await.unwrap();
        drop(client);

        let mut buf = BytesMut::new();
        let result = resolve_client(&mut server, &mut buf, &session(), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(GateError::Disconnected)));
    }
}
