//! Error types for the transactional outbox library.

use thiserror::Error;

/// Result type alias for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors that can occur while writing to the outbox.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database operation failed
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Record would decode into an unroutable event
    #[error("Invalid outbox record: {0}")]
    InvalidRecord(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl OutboxError {
    /// Whether retrying the surrounding transaction can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OutboxError::DatabaseError(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            OutboxError::InvalidRecord(_) | OutboxError::SerializationError(_) => false,
        }
    }
}
