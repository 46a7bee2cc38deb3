//! Device health state machine
//!
//! Tracks the coarse `ON`/`FAULT` state of the bridge together with a status
//! message, published through a `tokio::sync::watch` channel so the hosting
//! framework can either poll [`HealthMonitor::current`] or subscribe.
//!
//! FAULT is sticky: once entered, only a forced transition (issued by
//! re-initialization) can leave it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::{info, warn};

/// Operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    /// Instrument reachable and identified.
    On,
    /// Communication failed; operations are refused.
    Fault,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::On => write!(f, "ON"),
            HealthState::Fault => write!(f, "FAULT"),
        }
    }
}

/// State plus free-text status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current state.
    pub state: HealthState,
    /// Human readable status.
    pub message: String,
}

impl HealthStatus {
    fn new(state: HealthState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// Owner of the health state.
#[derive(Debug)]
pub struct HealthMonitor {
    sender: watch::Sender<HealthStatus>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// Starts in FAULT until the first successful initialization.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(HealthStatus::new(HealthState::Fault, "Not initialized"));
        Self { sender }
    }

    /// Snapshot of state and message.
    pub fn current(&self) -> HealthStatus {
        self.sender.borrow().clone()
    }

    /// Current state only.
    pub fn state(&self) -> HealthState {
        self.sender.borrow().state
    }

    /// Receiver notified on every applied transition.
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.sender.subscribe()
    }

    /// Apply a transition and return whether it took effect.
    ///
    /// Without `force`, a transition out of FAULT or into the current state is
    /// ignored. State and message are replaced together.
    pub fn transition(&self, new_state: HealthState, message: impl Into<String>, force: bool) -> bool {
        let message = message.into();
        let applied = self.sender.send_if_modified(|status| {
            if status.state == HealthState::Fault && !force {
                return false;
            }
            if status.state == new_state && !force {
                return false;
            }
            status.state = new_state;
            status.message = message.clone();
            true
        });

        if applied {
            match new_state {
                HealthState::On => info!(state = %new_state, status = %message, "Health transition"),
                HealthState::Fault => warn!(state = %new_state, status = %message, "Health transition"),
            }
        }
        applied
    }
}
