// src/core/errors.rs

//! Defines the primary error type for the entire monitor.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, covering every failure an operator or keeper can
/// observe. Each variant maps onto a stable wire class (see [`MonitorError::class`]),
/// so callers can tell retryable conditions from definitive rejections.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// An object definition conflicts with the formation it targets
    /// (wrong dbname, wrong kind, second node in a non-HA formation, ...).
    #[error("Invalid object definition: {0}")]
    InvalidObjectDefinition(String),

    /// Unknown formation, group, or node.
    #[error("Object not found: {0}")]
    UndefinedObject(String),

    /// The operation is valid, but not from the object's current state.
    #[error("Operation not allowed in current state: {0}")]
    ObjectNotInPrerequisiteState(String),

    /// The object still has dependents (e.g. dropping a formation with nodes).
    #[error("Object in use: {0}")]
    ObjectInUse(String),

    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    #[error("Feature not supported: {0}")]
    FeatureNotSupported(String),

    /// A structural guarantee of the group no longer holds. This aborts the
    /// enclosing operation and is surfaced to the operator; it is never
    /// silently repaired.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Transient condition, the caller should retry shortly. Raised during
    /// standby registration while a failover is in progress.
    #[error("{0}, retry in a moment")]
    TryAgain(String),

    /// Transport-level fault; recognized by callers as retryable.
    #[error("Connection exception: {0}")]
    ConnectionException(String),

    #[error("Invalid log sequence number: {0}")]
    InvalidLsn(String),
}

impl MonitorError {
    /// The stable error class exposed on the wire.
    pub fn class(&self) -> &'static str {
        match self {
            MonitorError::Io(_) | MonitorError::ConnectionException(_) => "connection_exception",
            MonitorError::InvalidObjectDefinition(_) => "invalid_object_definition",
            MonitorError::UndefinedObject(_) => "undefined_object",
            MonitorError::ObjectNotInPrerequisiteState(_) | MonitorError::TryAgain(_) => {
                "object_not_in_prerequisite_state"
            }
            MonitorError::ObjectInUse(_) => "object_in_use",
            MonitorError::InvalidParameterValue(_) | MonitorError::InvalidLsn(_) => {
                "invalid_parameter_value"
            }
            MonitorError::FeatureNotSupported(_) => "feature_not_supported",
            MonitorError::InvariantViolation(_) => "internal_error",
        }
    }

    /// Whether the caller should retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::TryAgain(_) | MonitorError::ConnectionException(_) | MonitorError::Io(_)
        )
    }

    /// An optional operator-facing hint.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            MonitorError::TryAgain(_) => {
                Some("the group has no writable node yet; retry the same call shortly")
            }
            MonitorError::InvariantViolation(_) => {
                Some("inspect current_state and last_events for this group")
            }
            _ => None,
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for MonitorError {
    fn clone(&self) -> Self {
        match self {
            MonitorError::Io(e) => MonitorError::Io(Arc::clone(e)),
            MonitorError::InvalidObjectDefinition(s) => {
                MonitorError::InvalidObjectDefinition(s.clone())
            }
            MonitorError::UndefinedObject(s) => MonitorError::UndefinedObject(s.clone()),
            MonitorError::ObjectNotInPrerequisiteState(s) => {
                MonitorError::ObjectNotInPrerequisiteState(s.clone())
            }
            MonitorError::ObjectInUse(s) => MonitorError::ObjectInUse(s.clone()),
            MonitorError::InvalidParameterValue(s) => {
                MonitorError::InvalidParameterValue(s.clone())
            }
            MonitorError::FeatureNotSupported(s) => MonitorError::FeatureNotSupported(s.clone()),
            MonitorError::InvariantViolation(s) => MonitorError::InvariantViolation(s.clone()),
            MonitorError::TryAgain(s) => MonitorError::TryAgain(s.clone()),
            MonitorError::ConnectionException(s) => MonitorError::ConnectionException(s.clone()),
            MonitorError::InvalidLsn(s) => MonitorError::InvalidLsn(s.clone()),
        }
    }
}

impl PartialEq for MonitorError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MonitorError::Io(e1), MonitorError::Io(e2)) => e1.to_string() == e2.to_string(),
            (MonitorError::InvalidObjectDefinition(a), MonitorError::InvalidObjectDefinition(b))
            | (MonitorError::UndefinedObject(a), MonitorError::UndefinedObject(b))
            | (
                MonitorError::ObjectNotInPrerequisiteState(a),
                MonitorError::ObjectNotInPrerequisiteState(b),
            )
            | (MonitorError::ObjectInUse(a), MonitorError::ObjectInUse(b))
            | (MonitorError::InvalidParameterValue(a), MonitorError::InvalidParameterValue(b))
            | (MonitorError::FeatureNotSupported(a), MonitorError::FeatureNotSupported(b))
            | (MonitorError::InvariantViolation(a), MonitorError::InvariantViolation(b))
            | (MonitorError::TryAgain(a), MonitorError::TryAgain(b))
            | (MonitorError::ConnectionException(a), MonitorError::ConnectionException(b))
            | (MonitorError::InvalidLsn(a), MonitorError::InvalidLsn(b)) => a == b,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::ConnectionException(format!("JSON serialization error: {e}"))
    }
}
