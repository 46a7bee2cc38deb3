//! Attribute bridge for the Libera Bunch-by-Bunch front end (BBFE).
//!
//! The front end exposes a line-oriented text console over TCP. This crate
//! presents it as a set of named, typed attributes:
//!
//! - [`schema`]: the static attribute table and value typing
//! - [`codec`]: request encoding and reply decoding
//! - [`link`]: connection, handshake and the transport seam
//! - [`health`]: the ON/FAULT state machine
//! - [`policy`]: state-based access gating
//! - [`bridge`]: the orchestrator tying them together
//!
//! Configuration ([`config`]) and tracing setup ([`logging`]) are used by the
//! `bbfe` binary.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod health;
pub mod link;
pub mod logging;
pub mod policy;
pub mod schema;

pub use bridge::AttributeBridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult, LinkError};
pub use health::{HealthMonitor, HealthState, HealthStatus};
pub use link::{Endpoint, InstrumentLink, LinkSettings, TcpTransport, Transport};
pub use policy::{AccessPolicy, AccessRule, OperationKind};
pub use schema::{AttributeSchema, AttributeSpec, TypedValue, ValueType};
