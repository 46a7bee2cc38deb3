//! TCP transport for the instrument console.

use super::{Endpoint, Transport};
use crate::error::LinkError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Transport over a Tokio `TcpStream`.
///
/// Every operation runs under `tokio::time::timeout`; an elapsed timer is
/// reported as [`LinkError::Timeout`] and a zero-length read as
/// [`LinkError::Closed`].
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, LinkError> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, endpoint: &Endpoint, limit: Duration) -> Result<(), LinkError> {
        let stream = timeout(limit, TcpStream::connect((endpoint.host.as_str(), endpoint.port)))
            .await
            .map_err(|_| LinkError::Timeout(limit))??;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "TCP connection established");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8], limit: Duration) -> Result<(), LinkError> {
        let stream = self.stream()?;
        timeout(limit, stream.write_all(bytes))
            .await
            .map_err(|_| LinkError::Timeout(limit))??;
        Ok(())
    }

    async fn receive(&mut self, max_len: usize, limit: Duration) -> Result<Vec<u8>, LinkError> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; max_len];
        let n = timeout(limit, stream.read(&mut buf))
            .await
            .map_err(|_| LinkError::Timeout(limit))??;
        if n == 0 {
            return Err(LinkError::Closed);
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best effort: the peer may already be gone.
            let _ = stream.shutdown().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"TEM:INS?\r\n");
            socket.write_all(b"TEM:INS 30.5\r\nOK\r\nscpi>").await.unwrap();
        });

        let mut transport = TcpTransport::new();
        let limit = Duration::from_secs(1);
        transport.connect(&Endpoint::new("127.0.0.1", port), limit).await.unwrap();
        assert!(transport.is_connected());
        transport.send(b"TEM:INS?\r\n", limit).await.unwrap();
        let reply = transport.receive(4096, limit).await.unwrap();
        assert_eq!(reply, b"TEM:INS 30.5\r\nOK\r\nscpi>");
        server.await.unwrap();

        transport.close().await;
        transport.close().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::new();
        let limit = Duration::from_millis(100);
        transport.connect(&Endpoint::new("127.0.0.1", port), Duration::from_secs(1)).await.unwrap();
        let err = transport.receive(4096, limit).await.unwrap_err();
        assert!(matches!(err, LinkError::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut transport = TcpTransport::new();
        let limit = Duration::from_secs(1);
        transport.connect(&Endpoint::new("127.0.0.1", port), limit).await.unwrap();
        server.await.unwrap();
        let err = transport.receive(4096, limit).await.unwrap_err();
        assert!(matches!(err, LinkError::Closed | LinkError::Io(_)));
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let mut transport = TcpTransport::new();
        let err = transport.send(b"*RST\r\n", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new();
        let err = transport
            .connect(&Endpoint::new("127.0.0.1", port), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Io(_) | LinkError::Timeout(_)));
        assert!(!transport.is_connected());
    }
}
