//! Instrument link
//!
//! Owns the connection to the instrument console and performs the startup
//! handshake. The byte transport sits behind the [`Transport`] trait so the
//! same link logic drives a real TCP socket ([`TcpTransport`]) or a scripted
//! double ([`MockTransport`]).
//!
//! The console is prompt driven: every request is answered by a frame ending
//! in the prompt, so the link performs exactly one request/reply round-trip at
//! a time and never pipelines.

pub mod mock;
pub mod tcp;

pub use mock::{MockReply, MockTransport};
pub use tcp::TcpTransport;

use crate::codec::{self, RequestLine, ResponseFrame};
use crate::error::{BridgeError, BridgeResult, LinkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default instrument port (telnet).
pub const DEFAULT_PORT: u16 = 23;
/// Default socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default receive buffer size.
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Network endpoint of the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Fixed I/O bounds of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Bound on connect, each send and each receive.
    pub timeout: Duration,
    /// Maximum bytes accepted by one receive.
    pub receive_buffer_size: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
        }
    }
}

/// Byte transport underneath the link.
///
/// Implementations must bound every call by `timeout` and report a peer close
/// as [`LinkError::Closed`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection.
    async fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<(), LinkError>;

    /// Write all bytes.
    async fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), LinkError>;

    /// Read whatever one receive returns, at most `max_len` bytes.
    async fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, LinkError>;

    /// Release the connection. Calling it twice is harmless.
    async fn close(&mut self);

    /// Whether a connection is currently held.
    fn is_connected(&self) -> bool;
}

/// Connection to the instrument console.
#[derive(Debug)]
pub struct InstrumentLink<T: Transport> {
    transport: T,
    settings: LinkSettings,
    endpoint: Option<Endpoint>,
}

impl<T: Transport> InstrumentLink<T> {
    /// Wrap a transport. Nothing is opened until [`connect`](Self::connect).
    pub fn new(transport: T, settings: LinkSettings) -> Self {
        Self {
            transport,
            settings,
            endpoint: None,
        }
    }

    /// Link I/O bounds.
    pub fn settings(&self) -> LinkSettings {
        self.settings
    }

    /// Endpoint of the last connect attempt.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Whether the transport holds a connection.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the TCP connection, closing any previous one first.
    ///
    /// # Errors
    ///
    /// `Connection` on refusal, timeout or resolution failure.
    pub async fn connect(&mut self, host: &str, port: u16) -> BridgeResult<()> {
        self.close().await;
        let endpoint = Endpoint::new(host, port);
        debug!(%endpoint, "Connecting to instrument");

        let result = self.transport.connect(&endpoint, self.settings.timeout).await;
        self.endpoint = Some(endpoint.clone());
        result.map_err(|source| {
            error!(%endpoint, error = %source, "Connection failed");
            BridgeError::Connection {
                endpoint: endpoint.to_string(),
                source,
            }
        })
    }

    /// Run the console handshake and return the identity reply.
    ///
    /// 1. read and discard the greeting banner;
    /// 2. send the console token and discard its reply;
    /// 3. query `*IDN?` and require the product marker in the reply.
    ///
    /// # Errors
    ///
    /// `HandshakeFailed` when any step fails or the marker is missing.
    pub async fn handshake(&mut self) -> BridgeResult<String> {
        let failed = |step: &str, e: LinkError| BridgeError::HandshakeFailed(format!("{step}: {e}"));

        let banner = self.receive_frame().await.map_err(|e| failed("greeting", e))?;
        debug!(%banner, "Handshake greeting");

        let console = self
            .query(&codec::encode_command(codec::CONSOLE_TOKEN))
            .await
            .map_err(|e| failed("console activation", e))?;
        debug!(%console, "Handshake console reply");

        let identity = self
            .query(&codec::encode_read(codec::IDENTITY_KEYWORD))
            .await
            .map_err(|e| failed("identity query", e))?;
        debug!(%identity, "Handshake identity reply");

        if !identity.contains(codec::PRODUCT_MARKER) {
            return Err(BridgeError::HandshakeFailed(format!("unexpected identity {identity}")));
        }

        let identity = identity.text().trim().to_string();
        info!(%identity, "Instrument identified");
        Ok(identity)
    }

    /// Send one request line.
    pub async fn send_line(&mut self, line: &RequestLine) -> Result<(), LinkError> {
        debug!(request = %line, "Sending");
        self.transport.send(line.as_bytes(), self.settings.timeout).await
    }

    /// Receive one frame (a single bounded read).
    pub async fn receive_frame(&mut self) -> Result<ResponseFrame, LinkError> {
        let bytes = self
            .transport
            .receive(self.settings.receive_buffer_size, self.settings.timeout)
            .await?;
        let frame = ResponseFrame::new(bytes);
        debug!(answer = %frame, "Received");
        Ok(frame)
    }

    /// One request/reply round-trip.
    pub async fn query(&mut self, line: &RequestLine) -> Result<ResponseFrame, LinkError> {
        self.send_line(line).await?;
        self.receive_frame().await
    }

    /// Release the connection. Idempotent.
    pub async fn close(&mut self) {
        if self.transport.is_connected() {
            self.transport.close().await;
            if let Some(endpoint) = &self.endpoint {
                debug!(%endpoint, "Link closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(mock: &MockTransport) -> InstrumentLink<MockTransport> {
        InstrumentLink::new(mock.clone(), LinkSettings::default())
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let mock = MockTransport::bbfe();
        let mut link = link(&mock);
        link.connect("bbfe01", 23).await.unwrap();
        let identity = link.handshake().await.unwrap();
        assert!(identity.contains("BBFE"));
        assert_eq!(mock.sent_lines(), vec!["scpi\r\n", "*IDN?\r\n"]);
        assert_eq!(link.endpoint().unwrap().to_string(), "bbfe01:23");
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_product() {
        let mock = MockTransport::new();
        mock.push_reply("Welcome\r\n");
        mock.push_reply("scpi>");
        mock.push_reply("*IDN? Some Other Box\r\nOK\r\nscpi>");
        let mut link = link(&mock);
        link.connect("host", 23).await.unwrap();
        let err = link.handshake().await.unwrap_err();
        assert!(matches!(err, BridgeError::HandshakeFailed(msg) if msg.contains("unexpected identity")));
    }

    #[tokio::test]
    async fn test_handshake_io_failure() {
        let mock = MockTransport::new();
        mock.push_reply("Welcome\r\n");
        mock.push(MockReply::Closed);
        let mut link = link(&mock);
        link.connect("host", 23).await.unwrap();
        let err = link.handshake().await.unwrap_err();
        assert!(err.to_string().contains("console activation"));
    }

    #[tokio::test]
    async fn test_connect_failure_maps_to_connection_error() {
        let mock = MockTransport::new();
        mock.fail_next_connect();
        let mut link = link(&mock);
        let err = link.connect("nowhere", 23).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection { ref endpoint, .. } if endpoint == "nowhere:23"));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = MockTransport::bbfe();
        let mut link = link(&mock);
        link.connect("host", 23).await.unwrap();
        link.close().await;
        link.close().await;
        assert!(!link.is_connected());
        assert_eq!(mock.call_log().iter().filter(|c| *c == "close").count(), 1);
    }

    #[tokio::test]
    async fn test_receive_respects_buffer_size() {
        let mock = MockTransport::new();
        mock.push_reply(vec![b'x'; 10]);
        let mut link = InstrumentLink::new(
            mock.clone(),
            LinkSettings {
                timeout: DEFAULT_TIMEOUT,
                receive_buffer_size: 4,
            },
        );
        link.connect("host", 23).await.unwrap();
        let frame = link.receive_frame().await.unwrap();
        assert_eq!(frame.as_bytes(), b"xxxx");
    }
}
