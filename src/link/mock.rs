//! Scripted transport for tests
//!
//! Replays a queue of canned replies instead of talking to hardware. It
//! provides:
//! - Scripted replies, timeouts and peer closes
//! - Controllable connect failure
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep a handle after moving the transport
//! into a bridge.

use super::{Endpoint, Transport};
use crate::error::LinkError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of one scripted receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Bytes returned by the receive.
    Data(Vec<u8>),
    /// Receive times out.
    Timeout,
    /// Peer closed the connection.
    Closed,
    /// Socket error of the given kind.
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    fail_next_connect: bool,
    fail_next_send: bool,
    receive_delay: Duration,
    replies: VecDeque<MockReply>,
    sent: Vec<String>,
    call_log: Vec<String>,
}

/// Mock transport with a shared reply script.
///
/// # Example
///
/// ```
/// use bbfe_bridge::link::MockTransport;
///
/// let mock = MockTransport::bbfe();
/// mock.push_reply("TEM:INS 31.0\r\nOK\r\nscpi>");
/// assert!(mock.sent_lines().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Empty script. A receive with nothing queued times out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script pre-loaded with a successful BBFE handshake.
    pub fn bbfe() -> Self {
        let mock = Self::new();
        mock.push_reply("Libera BBFE console\r\nscpi>");
        mock.push_reply("scpi>");
        mock.push_reply("*IDN? Instrumentation Technologies,Libera BBFE,0001,1.2\r\nOK\r\nscpi>");
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a scripted outcome.
    pub fn push(&self, reply: MockReply) {
        self.state().replies.push_back(reply);
    }

    /// Queue reply bytes.
    pub fn push_reply(&self, bytes: impl Into<Vec<u8>>) {
        self.push(MockReply::Data(bytes.into()));
    }

    /// Queue a receive timeout.
    pub fn push_timeout(&self) {
        self.push(MockReply::Timeout);
    }

    /// Make the next connect fail with `ConnectionRefused`.
    pub fn fail_next_connect(&self) {
        self.state().fail_next_connect = true;
    }

    /// Make the next send fail with `BrokenPipe`.
    pub fn fail_next_send(&self) {
        self.state().fail_next_send = true;
    }

    /// Delay every receive, to keep a call in flight.
    pub fn set_receive_delay(&self, delay: Duration) {
        self.state().receive_delay = delay;
    }

    /// Request lines sent so far, as text.
    pub fn sent_lines(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Every transport call in order (`connect`, `send`, `receive`, `close`).
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }

    /// Forget sent lines and call log; keeps the reply queue.
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.sent.clear();
        state.call_log.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, endpoint: &Endpoint, _timeout: Duration) -> Result<(), LinkError> {
        let mut state = self.state();
        state.call_log.push(format!("connect {endpoint}"));
        if std::mem::take(&mut state.fail_next_connect) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        state.connected = true;
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), LinkError> {
        let mut state = self.state();
        state.call_log.push("send".to_string());
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        if std::mem::take(&mut state.fail_next_send) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        state.sent.push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    async fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let delay = self.state().receive_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.call_log.push("receive".to_string());
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        match state.replies.pop_front() {
            Some(MockReply::Data(mut bytes)) => {
                if bytes.len() > max_len {
                    let rest = bytes.split_off(max_len);
                    state.replies.push_front(MockReply::Data(rest));
                }
                Ok(bytes)
            }
            Some(MockReply::Closed) => Err(LinkError::Closed),
            Some(MockReply::Error(kind)) => Err(io::Error::from(kind).into()),
            Some(MockReply::Timeout) | None => Err(LinkError::Timeout(timeout)),
        }
    }

    async fn close(&mut self) {
        let mut state = self.state();
        state.call_log.push("close".to_string());
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }
}
