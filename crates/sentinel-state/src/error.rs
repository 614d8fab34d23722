//! Error types for the state management layer

use sentinel_core::SentinelError;
use thiserror::Error;

/// Errors that can occur in state operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Stored value failed validation on load
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StateError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StateError::Connection(err.to_string())
            }
            sqlx::Error::Database(db_err) => StateError::Database(db_err.to_string()),
            _ => StateError::Database(err.to_string()),
        }
    }
}

impl From<StateError> for SentinelError {
    fn from(err: StateError) -> Self {
        SentinelError::Storage(err.to_string())
    }
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;
