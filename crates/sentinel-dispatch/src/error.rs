//! Lifecycle error types

use sentinel_core::SentinelError;
use thiserror::Error;

use crate::session::Phase;

/// Errors returned by lifecycle transitions and the dispatch handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Action not allowed in the current phase
    #[error("Cannot {action} while {from:?}")]
    InvalidTransition { from: Phase, action: &'static str },

    /// A route fetch for this session is already running
    #[error("A route request is already in flight")]
    TransitionInFlight,

    /// SOS cancelled while the user was still being located
    #[error("SOS cancelled before the session started")]
    SosCancelled,

    /// No SOS has been triggered
    #[error("No active dispatch session")]
    NoActiveSession,

    /// Facility id not in the current list
    #[error("Unknown facility: {0}")]
    UnknownFacility(String),

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Service channel closed
    #[error("Channel error: {0}")]
    Channel(String),

    /// Collaborator or validation failure
    #[error(transparent)]
    Core(#[from] SentinelError),
}

impl DispatchError {
    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DispatchError::TransitionInFlight => "TRANSITION_IN_FLIGHT",
            DispatchError::SosCancelled => "SOS_CANCELLED",
            DispatchError::NoActiveSession => "NO_ACTIVE_SESSION",
            DispatchError::UnknownFacility(_) => "UNKNOWN_FACILITY",
            DispatchError::InvalidInput(_) => "INVALID_INPUT",
            DispatchError::Channel(_) => "SERVICE_UNAVAILABLE",
            DispatchError::Core(e) => e.error_code(),
        }
    }

    /// Conflicts with the current lifecycle state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidTransition { .. }
                | DispatchError::TransitionInFlight
                | DispatchError::SosCancelled
                | DispatchError::NoActiveSession
        )
    }

    /// Check if this error is a client error (bad input)
    pub fn is_client_error(&self) -> bool {
        match self {
            DispatchError::UnknownFacility(_) | DispatchError::InvalidInput(_) => true,
            DispatchError::Core(e) => e.is_client_error(),
            _ => false,
        }
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, DispatchError>;
