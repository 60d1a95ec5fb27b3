//! Error types for the event bus library.

use thiserror::Error;

/// Result type alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur while talking to the message broker.
#[derive(Error, Debug)]
pub enum BusError {
    /// Could not reach the broker
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Stream lookup or creation failed; fatal at startup
    #[error("Stream provisioning failed for '{stream}': {reason}")]
    Provision { stream: String, reason: String },

    /// Subject is not captured by any filter of the stream
    #[error("Subject '{subject}' is not covered by stream '{stream}'")]
    SubjectNotCovered { stream: String, subject: String },

    /// Publishing (or waiting for the publish ack) failed
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Creating or binding the durable consumer failed
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// Pulling a batch failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Sending ack / nak / term failed
    #[error("Acknowledgement failed: {0}")]
    Ack(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("Bus error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BusError {
    /// Whether the operation may succeed if retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::Connection(_)
                | BusError::Publish(_)
                | BusError::Fetch(_)
                | BusError::Ack(_)
        )
    }
}
