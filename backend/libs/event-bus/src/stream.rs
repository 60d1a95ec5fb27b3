//! Idempotent provisioning of the durable stream.

use async_trait::async_trait;
use tracing::info;

use crate::config::{BusConfig, RetentionLimits};
use crate::error::{BusError, BusResult};
use crate::subjects::subject_matches;

/// Desired shape of a durable, file-backed, limits-retained stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: RetentionLimits,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, subjects: Vec<String>, retention: RetentionLimits) -> Self {
        Self {
            name: name.into(),
            subjects,
            retention,
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(
            config.stream_name.clone(),
            config.stream_subjects.clone(),
            config.retention.clone(),
        )
    }

    /// Whether a publish to `subject` would be captured by this stream.
    pub fn covers(&self, subject: &str) -> bool {
        self.subjects.iter().any(|f| subject_matches(f, subject))
    }

    /// Refuse subjects the broker would drop without telling anyone.
    pub fn check_covers(&self, subject: &str) -> BusResult<()> {
        if self.covers(subject) {
            Ok(())
        } else {
            Err(BusError::SubjectNotCovered {
                stream: self.name.clone(),
                subject: subject.to_string(),
            })
        }
    }
}

/// Result of a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another process created the stream first.
    AlreadyExists,
}

/// Result of [`ensure_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Existing,
}

/// Broker-side stream administration.
#[async_trait]
pub trait StreamAdmin: Send + Sync {
    /// `Ok(false)` only when the broker positively reports the stream missing.
    async fn stream_exists(&self, name: &str) -> BusResult<bool>;

    /// Create the stream. A name conflict is reported as
    /// [`CreateOutcome::AlreadyExists`], not as an error.
    async fn create_stream(&self, spec: &StreamSpec) -> BusResult<CreateOutcome>;
}

/// Make sure the stream exists.
///
/// An existing stream is accepted as is, without comparing its configuration.
/// Safe to call concurrently from every replica at startup.
pub async fn ensure_stream<A>(admin: &A, spec: &StreamSpec) -> BusResult<EnsureOutcome>
where
    A: StreamAdmin + ?Sized,
{
    if spec.subjects.is_empty() {
        return Err(BusError::Provision {
            stream: spec.name.clone(),
            reason: "no subject filters configured".to_string(),
        });
    }

    if admin.stream_exists(&spec.name).await? {
        info!(stream = %spec.name, "Stream already exists");
        return Ok(EnsureOutcome::Existing);
    }

    match admin.create_stream(spec).await? {
        CreateOutcome::Created => {
            info!(
                stream = %spec.name,
                subjects = ?spec.subjects,
                max_age_secs = spec.retention.max_age.as_secs(),
                max_bytes = spec.retention.max_bytes,
                max_messages = spec.retention.max_messages,
                "Stream provisioned"
            );
            Ok(EnsureOutcome::Created)
        }
        CreateOutcome::AlreadyExists => {
            info!(stream = %spec.name, "Stream created concurrently by another process");
            Ok(EnsureOutcome::Existing)
        }
    }
}
