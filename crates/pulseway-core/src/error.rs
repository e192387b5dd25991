//! Error taxonomy shared by every PulseWay component.
//!
//! Nothing here is fatal to the process: callers degrade to stale or empty
//! data and let the next reporting tick or explicit retry supersede the
//! failed operation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Location access was refused by the platform.
    #[error("Location permission denied")]
    PermissionDenied,

    /// A facility, vehicle, or link is absent.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A call to an external store failed; the operation is abandoned.
    #[error("Store call failed: {0}")]
    TransientIo(String),

    /// Malformed coordinate or identifier, rejected before any store call.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Two registrations normalized to the same facility id.
    #[error("Facility '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl DispatchError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::TransientIo(err.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when a later retry (or the next cadence tick) may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::TransientIo(format!("malformed document: {err}"))
    }
}
