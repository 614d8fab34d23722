//! Error types shared by every Sentinel crate
//!
//! Collaborator failures (routing, discovery, storage) and input
//! validation failures all surface as [`SentinelError`]. The lifecycle
//! decides per call site whether an error degrades to a fallback or
//! blocks the transition.

use thiserror::Error;

/// Main error type for Sentinel operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SentinelError {
    // ===== Input Errors =====
    /// Coordinate outside the WGS84 ranges or not finite
    #[error("Invalid coordinate: ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// Phone number with too few digits
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    // ===== Collaborator Errors =====
    /// Router reachable but could not produce a route
    #[error("Routing failed: {0}")]
    RoutingFailed(String),

    /// Router answered without any route
    #[error("No route between {from} and {to}")]
    NoRoute { from: String, to: String },

    /// Facility discovery failed
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Upstream service unreachable
    #[error("Connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Upstream answered with an unexpected body
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Upstream did not answer in time
    #[error("Timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Location could not be determined
    #[error("Geolocation unavailable: {0}")]
    GeolocationUnavailable(String),

    // ===== Storage Errors =====
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    // ===== Serialization Errors =====
    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    // ===== General Errors =====
    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SentinelError::Timeout { .. }
                | SentinelError::ConnectionFailed { .. }
                | SentinelError::Http { status: 429 | 500..=599, .. }
        )
    }

    /// Check if this error is a client error (bad input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SentinelError::InvalidCoordinate { .. }
                | SentinelError::InvalidPhoneNumber(_)
                | SentinelError::InvalidConfig(_)
        )
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            SentinelError::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            SentinelError::InvalidPhoneNumber(_) => "INVALID_PHONE_NUMBER",
            SentinelError::RoutingFailed(_) => "ROUTING_FAILED",
            SentinelError::NoRoute { .. } => "NO_ROUTE",
            SentinelError::DiscoveryFailed(_) => "DISCOVERY_FAILED",
            SentinelError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            SentinelError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            SentinelError::Timeout { .. } => "TIMEOUT",
            SentinelError::Http { .. } => "HTTP_ERROR",
            SentinelError::GeolocationUnavailable(_) => "GEOLOCATION_UNAVAILABLE",
            SentinelError::Storage(_) => "STORAGE_ERROR",
            SentinelError::Serialization(_) => "SERIALIZATION_ERROR",
            SentinelError::InvalidConfig(_) => "INVALID_CONFIG",
            SentinelError::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            SentinelError::Cancelled => "CANCELLED",
            SentinelError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for Sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

impl From<std::io::Error> for SentinelError {
    fn from(err: std::io::Error) -> Self {
        SentinelError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(err: serde_json::Error) -> Self {
        SentinelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SentinelError::RoutingFailed("code NoRoute".to_string());
        assert_eq!(err.error_code(), "ROUTING_FAILED");
        assert_eq!(SentinelError::Cancelled.error_code(), "CANCELLED");
    }

    #[test]
    fn test_is_retriable() {
        assert!(SentinelError::Timeout { duration_ms: 1000 }.is_retriable());
        assert!(SentinelError::Http {
            status: 503,
            body: String::new()
        }
        .is_retriable());
        assert!(!SentinelError::Http {
            status: 404,
            body: String::new()
        }
        .is_retriable());
        assert!(!SentinelError::InvalidPhoneNumber("12".into()).is_retriable());
    }

    #[test]
    fn test_is_client_error() {
        assert!(SentinelError::InvalidPhoneNumber("12".into()).is_client_error());
        assert!(!SentinelError::Internal("test".to_string()).is_client_error());
    }
}
