//! Access policy
//!
//! Decides whether an operation may run in the current health state. The
//! default rule refuses every operation while the device is in FAULT.
//! Individual attributes can override that rule through explicit table
//! entries.

use crate::health::HealthState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of externally requested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Attribute read.
    Read,
    /// Attribute write.
    Write,
    /// Command invocation (reset).
    Command,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
            OperationKind::Command => write!(f, "command"),
        }
    }
}

/// Per-attribute override rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRule {
    /// Follow the default state-based policy.
    Default,
    /// Always permitted, even in FAULT.
    Always,
    /// Never permitted.
    Never,
}

/// Default rule plus explicit overrides.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    overrides: HashMap<(String, OperationKind), AccessRule>,
}

impl AccessPolicy {
    /// Policy with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override for one attribute and operation kind.
    pub fn with_override(mut self, attribute: impl Into<String>, kind: OperationKind, rule: AccessRule) -> Self {
        self.overrides.insert((attribute.into(), kind), rule);
        self
    }

    /// Default rule: nothing runs in FAULT.
    pub fn allowed(&self, _kind: OperationKind, state: HealthState) -> bool {
        state != HealthState::Fault
    }

    /// Override for `attribute` if one exists, default rule otherwise.
    pub fn allowed_for(&self, attribute: &str, kind: OperationKind, state: HealthState) -> bool {
        match self.overrides.get(&(attribute.to_string(), kind)) {
            Some(AccessRule::Always) => true,
            Some(AccessRule::Never) => false,
            Some(AccessRule::Default) | None => self.allowed(kind, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blocks_everything_in_fault() {
        let policy = AccessPolicy::new();
        for kind in [OperationKind::Read, OperationKind::Write, OperationKind::Command] {
            assert!(policy.allowed(kind, HealthState::On));
            assert!(!policy.allowed(kind, HealthState::Fault));
        }
    }

    #[test]
    fn test_overrides() {
        let policy = AccessPolicy::new()
            .with_override("Temperature", OperationKind::Read, AccessRule::Always)
            .with_override("PhaseShift", OperationKind::Write, AccessRule::Never);

        assert!(policy.allowed_for("Temperature", OperationKind::Read, HealthState::Fault));
        assert!(!policy.allowed_for("Temperature", OperationKind::Write, HealthState::Fault));
        assert!(!policy.allowed_for("PhaseShift", OperationKind::Write, HealthState::On));
        assert!(policy.allowed_for("PhaseShift", OperationKind::Read, HealthState::On));
    }
}
