//! Error types for the replication decoder.

use thiserror::Error;

use crate::relation::RelationId;

/// Result type alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that can occur while turning replication messages into change rows.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// An insert referenced a relation whose definition was never received.
    ///
    /// Relation messages always precede data messages for a relation within a
    /// decoding session, so this means the decoder's schema view is stale or the
    /// stream did not start at a relation boundary. Never retried automatically.
    #[error("Unknown relation ID {0}")]
    UnknownRelation(RelationId),

    /// The `payload` column did not contain a JSON document.
    #[error("Invalid outbox payload for event '{event_id}': {source}")]
    InvalidPayload {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the canonical row failed
    #[error("Failed to serialize outbox row: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Malformed or truncated pgoutput bytes
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DecodeError {
    /// Whether the caller must stop trusting its stream position and resynchronize.
    pub fn requires_resync(&self) -> bool {
        matches!(self, DecodeError::UnknownRelation(_) | DecodeError::Protocol(_))
    }
}
