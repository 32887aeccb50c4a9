//! Error taxonomy for access processing
//!
//! Component errors (`Rejected`, `RegistryError`, `GateError`) are folded into
//! [`AccessError`] by the access controller. Nothing here is fatal to the
//! process; every variant is recovered locally and logged.

use crate::domain::policy::Decision;
use crate::domain::types::{GateId, Identity};
use thiserror::Error;

/// Recognition input that failed normalization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("plate {normalized:?} does not match identity pattern")]
    Format { normalized: String },

    #[error("empty recognition payload")]
    Empty,

    #[error("malformed tag payload")]
    MalformedTag,
}

/// Registry backing store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("registry record for {identity} kept changing under compare-and-set")]
    Contended { identity: String },
}

/// Failure reported by an actuator driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("actuator error on gate {gate}: {message}")]
pub struct ActuatorError {
    pub gate: GateId,
    pub message: String,
}

/// Gate cycle phase in which a fault occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Opening,
    Closing,
}

impl GatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePhase::Opening => "opening",
            GatePhase::Closing => "closing",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("gate {0} is mid-transition")]
    Busy(GateId),

    #[error("gate {0} is not configured")]
    UnknownGate(GateId),

    #[error("actuator fault while {}: {source}", phase.as_str())]
    ActuatorFault { phase: GatePhase, source: ActuatorError },
}

/// Failure reported by a display driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("display error: {0}")]
pub struct DisplayError(pub String);

/// Outcome taxonomy for one recognition event that did not result in a
/// completed gate cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("recognition input rejected: {0}")]
    FormatRejected(#[from] Rejected),

    #[error("identity {0} is not registered")]
    UnknownIdentity(Identity),

    #[error("access denied for {identity}: {}", decision.as_str())]
    PolicyDenied { identity: Identity, decision: Decision },

    #[error("registry unavailable, denying {identity}: {source}")]
    StorageUnavailable { identity: Identity, source: RegistryError },

    #[error("gate busy, cannot admit {identity}: {gate}")]
    GateBusy { identity: Identity, gate: GateId },

    #[error("gate fault while admitting {identity}: {source}")]
    ActuatorFault { identity: Identity, source: GateError },
}

impl AccessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics/audit
    pub fn as_label(&self) -> &'static str {
        match self {
            AccessError::FormatRejected(_) => "format_rejected",
            AccessError::UnknownIdentity(_) => "unknown_identity",
            AccessError::PolicyDenied { .. } => "policy_denied",
            AccessError::StorageUnavailable { .. } => "storage_unavailable",
            AccessError::GateBusy { .. } => "gate_busy",
            AccessError::ActuatorFault { .. } => "actuator_fault",
        }
    }

    /// Whether this outcome needs operator attention, as opposed to an
    /// ordinary denial
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            AccessError::StorageUnavailable { .. }
                | AccessError::GateBusy { .. }
                | AccessError::ActuatorFault { .. }
        )
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AccessError::FormatRejected(_) => None,
            AccessError::UnknownIdentity(identity)
            | AccessError::PolicyDenied { identity, .. }
            | AccessError::StorageUnavailable { identity, .. }
            | AccessError::GateBusy { identity, .. }
            | AccessError::ActuatorFault { identity, .. } => Some(identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let identity = Identity::Plate("P123".to_string());
        assert_eq!(AccessError::from(Rejected::Empty).as_label(), "format_rejected");
        assert_eq!(AccessError::UnknownIdentity(identity.clone()).as_label(), "unknown_identity");
        let busy = AccessError::GateBusy { identity, gate: GateId::new("entry") };
        assert_eq!(busy.as_label(), "gate_busy");
        assert!(busy.is_fault());
    }

    #[test]
    fn test_denials_are_not_faults() {
        let identity = Identity::Tag("77".to_string());
        let denied = AccessError::PolicyDenied {
            identity: identity.clone(),
            decision: Decision::DenyNotPresent,
        };
        assert!(!denied.is_fault());
        assert_eq!(denied.identity(), Some(&identity));
        assert_eq!(denied.to_string(), "access denied for 77: deny_not_present");
    }
}
