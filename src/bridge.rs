//! Attribute bridge
//!
//! Orchestrates every externally requested operation: schema lookup, local
//! validation, access gating, one serialized round-trip on the instrument
//! link, decoding, and health bookkeeping.
//!
//! ## Failure policy
//!
//! - Validation failures (`UnknownAttribute`, `ReadOnlyAttribute`,
//!   `NotAllowed`, `TypeMismatch`, `OutOfRange`) are returned before any I/O.
//! - Link failures surface as `Communication` and move health to FAULT.
//! - Garbled replies and instrument refusals are per-call errors and leave
//!   health untouched.
//! - Nothing is retried; the caller decides whether to re-initialize.
//!
//! ## Example
//!
//! ```no_run
//! use bbfe_bridge::{AttributeBridge, AttributeSchema, HealthState, LinkSettings};
//!
//! # async fn example() -> Result<(), bbfe_bridge::BridgeError> {
//! let bridge = AttributeBridge::new(AttributeSchema::libera_bbfe(), LinkSettings::default());
//! bridge.initialize("bbfe01.example.org", 23).await;
//!
//! if bridge.health().state == HealthState::On {
//!     let temperature = bridge.read_attribute("Temperature").await?;
//!     println!("Temperature: {temperature} C");
//!     bridge.write_attribute("PhaseClock1", 20.into()).await?;
//! }
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::codec::{self, RequestLine, ResponseFrame};
use crate::config::InstrumentConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::health::{HealthMonitor, HealthState, HealthStatus};
use crate::link::{InstrumentLink, LinkSettings, TcpTransport, Transport};
use crate::policy::{AccessPolicy, OperationKind};
use crate::schema::{AttributeSchema, TypedValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

const READ_COMM_ERROR: &str = "Comm error while requesting data from instrument";
const WRITE_COMM_ERROR: &str = "Comm error while sending data to instrument";
const COMMAND_COMM_ERROR: &str = "Comm error while sending command to instrument";

/// Bridge between named attributes and the instrument console.
///
/// All link traffic runs under one mutex, held for a full request/reply
/// round-trip, so concurrent callers queue instead of interleaving.
pub struct AttributeBridge<T: Transport = TcpTransport> {
    schema: Arc<AttributeSchema>,
    policy: AccessPolicy,
    link: Mutex<InstrumentLink<T>>,
    health: HealthMonitor,
    close_requested: AtomicBool,
}

impl AttributeBridge<TcpTransport> {
    /// Bridge over a TCP transport.
    pub fn new(schema: Arc<AttributeSchema>, settings: LinkSettings) -> Self {
        Self::with_transport(schema, TcpTransport::new(), settings)
    }

    /// BBFE bridge over TCP with the configured link bounds.
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(AttributeSchema::libera_bbfe(), config.link_settings())
    }
}

impl<T: Transport> AttributeBridge<T> {
    /// Bridge over any transport.
    pub fn with_transport(schema: Arc<AttributeSchema>, transport: T, settings: LinkSettings) -> Self {
        Self {
            schema,
            policy: AccessPolicy::new(),
            link: Mutex::new(InstrumentLink::new(transport, settings)),
            health: HealthMonitor::new(),
            close_requested: AtomicBool::new(false),
        }
    }

    /// Replace the access policy.
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attribute table served by this bridge.
    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    /// Current health state and message.
    pub fn health(&self) -> HealthStatus {
        self.health.current()
    }

    /// Receiver notified on every health transition.
    pub fn subscribe_health(&self) -> watch::Receiver<HealthStatus> {
        self.health.subscribe()
    }

    /// Default gate: nothing runs in FAULT.
    pub fn allowed(&self, kind: OperationKind) -> bool {
        self.policy.allowed(kind, self.health.state())
    }

    /// Gate for one attribute, honouring per-attribute overrides.
    pub fn allowed_for(&self, attribute: &str, kind: OperationKind) -> bool {
        self.policy.allowed_for(attribute, kind, self.health.state())
    }

    /// Connect and handshake, recording the outcome as health.
    ///
    /// Never fails: a connection or handshake error forces FAULT with a
    /// descriptive message, success forces ON. Any previous connection is
    /// closed first, so calling this again is the re-initialization path.
    pub async fn initialize(&self, host: &str, port: u16) -> HealthStatus {
        let mut link = self.link.lock().await;
        self.close_requested.store(false, Ordering::SeqCst);
        info!(host, port, "Initializing instrument link");

        let outcome = match link.connect(host, port).await {
            Ok(()) => link.handshake().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(identity) => {
                debug!(%identity, "Handshake complete");
                self.health.transition(HealthState::On, "System seems OK", true);
            }
            Err(e) => {
                error!(error = %e, "Unable to communicate with instrument");
                link.close().await;
                let message = match &e {
                    BridgeError::HandshakeFailed(detail) => format!("Invalid answer from instrument: {detail}"),
                    _ => format!("Unable to communicate with instrument: {e}"),
                };
                self.health.transition(HealthState::Fault, message, true);
            }
        }

        if self.close_requested.load(Ordering::SeqCst) {
            link.close().await;
            self.health
                .transition(HealthState::Fault, "Shut down during initialization", true);
        }
        self.release(link).await;
        self.health.current()
    }

    /// Query the instrument for an attribute's current value.
    pub async fn read_attribute(&self, name: &str) -> BridgeResult<TypedValue> {
        let spec = self.schema.lookup(name)?;
        self.gate(Some(name), OperationKind::Read)?;

        let frame = self
            .exchange(Some(name), OperationKind::Read, codec::encode_read(&spec.read_keyword), READ_COMM_ERROR)
            .await?;

        let decoded = codec::decode_response(frame.as_bytes(), &spec.read_keyword).inspect_err(|e| {
            error!(attribute = name, error = %e, "Error processing answer from instrument");
        })?;
        if !decoded.status_ok {
            warn!(attribute = name, answer = %frame, "Read answered without OK status");
        }

        let value = codec::coerce(&decoded.value_token, spec.value_type).inspect_err(|e| {
            error!(attribute = name, error = %e, "Error processing answer from instrument");
        })?;
        debug!(
            attribute = name,
            %value,
            unit = decoded.unit.as_deref().unwrap_or_default(),
            "Read complete"
        );
        Ok(value)
    }

    /// Write an attribute.
    pub async fn write_attribute(&self, name: &str, value: TypedValue) -> BridgeResult<()> {
        let spec = self.schema.lookup(name)?;
        let keyword = spec
            .write_keyword
            .as_deref()
            .ok_or_else(|| BridgeError::ReadOnlyAttribute(name.to_string()))?;
        self.gate(Some(name), OperationKind::Write)?;
        spec.check_value(&value)?;

        let request = codec::encode_write(keyword, &value.to_string());
        let frame = self
            .exchange(Some(name), OperationKind::Write, request, WRITE_COMM_ERROR)
            .await?;

        if !frame.is_acknowledged() {
            error!(attribute = name, answer = %frame, "Seems like attribute was not correctly written");
            return Err(BridgeError::WriteRejected {
                attribute: name.to_string(),
                response: frame.text().into_owned(),
            });
        }
        debug!(attribute = name, %value, "Write acknowledged");
        Ok(())
    }

    /// Send the instrument reset command.
    pub async fn reset(&self) -> BridgeResult<()> {
        self.gate(None, OperationKind::Command)?;

        let frame = self
            .exchange(None, OperationKind::Command, codec::encode_command(codec::RESET_COMMAND), COMMAND_COMM_ERROR)
            .await?;

        if !frame.is_acknowledged() {
            error!(answer = %frame, "Seems like the reset was not correctly processed");
            return Err(BridgeError::ResetRejected(frame.text().into_owned()));
        }
        info!("Instrument reset acknowledged");
        Ok(())
    }

    /// Close the link. Idempotent and never waits for an in-flight call: when
    /// the link is busy, the close happens as soon as that call finishes.
    pub async fn shutdown(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        match self.link.try_lock() {
            Ok(mut link) => link.close().await,
            Err(_) => debug!("Link busy, close deferred to end of current call"),
        }
    }

    /// Whether the link currently holds a connection. Waits for any
    /// in-flight call.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_connected()
    }

    /// Unlock the link, honouring a pending shutdown.
    async fn release(&self, mut link: MutexGuard<'_, InstrumentLink<T>>) {
        if self.close_requested.load(Ordering::SeqCst) {
            link.close().await;
            return;
        }
        drop(link);
        // A shutdown that found the lock held just before the unlock.
        if self.close_requested.load(Ordering::SeqCst) {
            if let Ok(mut link) = self.link.try_lock() {
                link.close().await;
            }
        }
    }

    fn gate(&self, attribute: Option<&str>, kind: OperationKind) -> BridgeResult<()> {
        let permitted = match attribute {
            Some(name) => self.allowed_for(name, kind),
            None => self.allowed(kind),
        };
        if permitted {
            Ok(())
        } else {
            Err(BridgeError::NotAllowed {
                operation: match attribute {
                    Some(name) => format!("{kind} of '{name}'"),
                    None => kind.to_string(),
                },
                state: self.health.state(),
            })
        }
    }

    async fn exchange(
        &self,
        attribute: Option<&str>,
        kind: OperationKind,
        request: RequestLine,
        fault_message: &str,
    ) -> BridgeResult<ResponseFrame> {
        let mut link = self.link.lock().await;
        // Health may have changed while waiting for the lock.
        if let Err(e) = self.gate(attribute, kind) {
            self.release(link).await;
            return Err(e);
        }

        let result = link.query(&request).await;
        self.release(link).await;

        result.map_err(|e| {
            let detail = e.to_string();
            let err = BridgeError::Communication(e);
            error!(request = %request, error = %detail, "{fault_message}");
            if err.touches_health() {
                self.health
                    .transition(HealthState::Fault, format!("{fault_message}: {detail}"), false);
            }
            err
        })
    }
}
