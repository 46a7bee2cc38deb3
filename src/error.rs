//! Error types for the instrument bridge.
//!
//! This module defines the primary error type, `BridgeError`, returned by every
//! bridge operation, and `LinkError`, the transport-level failure raised by the
//! instrument link. Using the `thiserror` crate keeps every failure typed and
//! carrying a human-readable message for the hosting framework.
//!
//! ## Error Hierarchy
//!
//! `BridgeError` groups its variants by where the failure originates:
//!
//! - **Local validation** (`UnknownAttribute`, `ReadOnlyAttribute`, `NotAllowed`,
//!   `TypeMismatch`, `OutOfRange`): rejected before any byte is sent.
//! - **Initialization** (`Connection`, `HandshakeFailed`): raised while opening
//!   the link; the bridge records them as FAULT health instead of returning them.
//! - **Runtime I/O** (`Communication`): the only category that moves the health
//!   state machine into FAULT.
//! - **Payload** (`MalformedResponse`, `UnexpectedEcho`, `ValueCoercion`): a
//!   single garbled exchange, surfaced per call.
//! - **Instrument refusal** (`WriteRejected`, `ResetRejected`): the instrument
//!   answered but did not acknowledge with `OK`.

use crate::health::HealthState;
use crate::schema::ValueType;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Failure of a single socket operation on the instrument link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed by instrument")]
    Closed,

    #[error("Link not connected")]
    NotConnected,
}

/// Error returned by bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Attribute '{0}' is read-only")]
    ReadOnlyAttribute(String),

    #[error("{operation} not allowed while device is {state}")]
    NotAllowed {
        operation: String,
        state: HealthState,
    },

    #[error("Attribute '{attribute}' expects a {expected} value")]
    TypeMismatch {
        attribute: String,
        expected: ValueType,
    },

    #[error("Value {value} for '{attribute}' is out of range [{min}, {max}]")]
    OutOfRange {
        attribute: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid attribute schema: {0}")]
    InvalidSchema(String),

    #[error("Unable to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: LinkError,
    },

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Comm error with instrument: {0}")]
    Communication(#[from] LinkError),

    #[error("Malformed response from instrument: {0:?}")]
    MalformedResponse(String),

    #[error("Unexpected echo: expected '{expected}', got '{found}'")]
    UnexpectedEcho { expected: String, found: String },

    #[error("Cannot convert '{token}' to {value_type}")]
    ValueCoercion { token: String, value_type: ValueType },

    #[error("Instrument rejected write of '{attribute}': {response:?}")]
    WriteRejected { attribute: String, response: String },

    #[error("Instrument rejected reset: {0:?}")]
    ResetRejected(String),
}

impl BridgeError {
    /// True for link-layer failures, the only errors that degrade health.
    pub fn touches_health(&self) -> bool {
        matches!(
            self,
            BridgeError::Communication(_)
                | BridgeError::Connection { .. }
                | BridgeError::HandshakeFailed(_)
        )
    }

    /// True when the error was raised before any I/O was attempted.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownAttribute(_)
                | BridgeError::ReadOnlyAttribute(_)
                | BridgeError::NotAllowed { .. }
                | BridgeError::TypeMismatch { .. }
                | BridgeError::OutOfRange { .. }
                | BridgeError::InvalidSchema(_)
        )
    }
}
