//! Maps every domain event onto one audit log row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use event_bus::subjects::source_service_from_subject;
use event_bus::{optional_uuid, require_uuid, EventHandler, InboundEvent, PoisonPill, TransientError};
use tracing::{debug, warn};

use crate::store::{AuditLog, AuditLogStore};

/// Parsed message plus the routing facts taken from its subject.
#[derive(Debug)]
pub struct AuditCandidate {
    pub subject: String,
    pub source_service: String,
    pub event: InboundEvent,
}

pub struct AuditEventHandler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AuditLogStore + ?Sized> AuditEventHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// `trace_id` embedded in the payload by producers that propagate traces.
fn trace_id(event: &InboundEvent) -> Option<String> {
    let payload = event.payload.as_ref()?;
    let value: serde_json::Value = serde_json::from_str(payload.get()).ok()?;
    value.get("trace_id")?.as_str().map(String::from)
}

#[async_trait]
impl<S: AuditLogStore + ?Sized> EventHandler for AuditEventHandler<S> {
    type Event = AuditCandidate;
    type Valid = AuditLog;

    fn parse(&self, subject: &str, payload: &[u8]) -> Result<AuditCandidate, PoisonPill> {
        let event = InboundEvent::parse(payload)
            .map_err(|p| PoisonPill::new(format!("[{}] {}", subject, p.reason)))?;
        Ok(AuditCandidate {
            subject: subject.to_string(),
            source_service: source_service_from_subject(subject).to_string(),
            event,
        })
    }

    fn validate(&self, candidate: AuditCandidate) -> Result<AuditLog, PoisonPill> {
        let AuditCandidate {
            subject,
            source_service,
            event,
        } = candidate;

        let raw_id = event
            .event_id()
            .ok_or_else(|| PoisonPill::new(format!("missing event id [{}]", subject)))?;
        let event_id = require_uuid("event_id", &raw_id)?;
        let organization_id = optional_uuid("organization_id", &event.organization_id)?;

        // System events have no actor; a malformed one is dropped, not fatal.
        let actor_id = match optional_uuid("actor_id", &event.actor_id) {
            Ok(actor) => actor,
            Err(e) => {
                warn!(actor_id = %event.actor_id, reason = %e.reason, "Unparseable actor_id, persisting without it");
                None
            }
        };

        let payload = match &event.payload {
            Some(raw) => serde_json::from_str(raw.get())
                .map_err(|e| PoisonPill::new(format!("payload: {}", e)))?,
            None => serde_json::Value::Null,
        };

        if let Some(trace_id) = trace_id(&event) {
            debug!(event_id = %event_id, trace_id = %trace_id, "Audit event carries trace context");
        }

        Ok(AuditLog {
            event_id,
            organization_id,
            source_service,
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            event_type: event.event_type().to_string(),
            payload,
            actor_id,
            created_at: event.created_at.unwrap_or_else(Utc::now),
        })
    }

    async fn apply(&self, entry: AuditLog) -> Result<(), TransientError> {
        let inserted = self
            .store
            .insert_if_absent(&entry)
            .await
            .map_err(|e| TransientError::new(format!("insert audit log {}: {}", entry.event_id, e)))?;

        debug!(
            event_id = %entry.event_id,
            source = %entry.source_service,
            event_type = %entry.event_type,
            duplicate = !inserted,
            "Audit log written"
        );
        Ok(())
    }
}
