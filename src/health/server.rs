//! Plain TCP health endpoint.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub const HEALTH_RESPONSE: &[u8] = b"OK\n";

pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    pub async fn bind(address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Answer probes until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(address) = self.listener.local_addr() {
            tracing::info!(%address, "Health socket listening");
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((mut stream, peer)) => {
                        tokio::spawn(async move {
                            if let Err(e) = stream.write_all(HEALTH_RESPONSE).await {
                                tracing::debug!(%peer, error = %e, "Health probe write failed");
                            }
                            let _ = stream.shutdown().await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Health accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Health socket received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn answers_ok_and_stops_on_shutdown() {
        let server = HealthServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(shutdown.subscribe()));

        let mut probe = TcpStream::connect(addr).await.unwrap();
        let mut body = Vec::new();
        probe.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, HEALTH_RESPONSE);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
