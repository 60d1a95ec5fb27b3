//! Bridges the durable consumer to the webhook dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::subjects::event_type_from_subject;
use event_bus::{EventHandler, PoisonPill, TransientError};
use serde_json::value::RawValue;
use tracing::debug;

use crate::services::webhook_dispatcher::WebhookDispatcher;

/// Event type derived from the subject plus the body forwarded verbatim.
#[derive(Debug)]
pub struct WebhookEvent {
    pub event_type: String,
    pub payload: Box<RawValue>,
}

pub struct WebhookEventHandler {
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookEventHandler {
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventHandler for WebhookEventHandler {
    type Event = WebhookEvent;
    type Valid = WebhookEvent;

    fn parse(&self, subject: &str, payload: &[u8]) -> Result<WebhookEvent, PoisonPill> {
        let payload: Box<RawValue> = serde_json::from_slice(payload)
            .map_err(|e| PoisonPill::new(format!("[{}] malformed body: {}", subject, e)))?;
        Ok(WebhookEvent {
            event_type: event_type_from_subject(subject).to_string(),
            payload,
        })
    }

    fn validate(&self, event: WebhookEvent) -> Result<WebhookEvent, PoisonPill> {
        if event.event_type.is_empty() {
            return Err(PoisonPill::new("subject carries no event type"));
        }
        Ok(event)
    }

    async fn apply(&self, event: WebhookEvent) -> Result<(), TransientError> {
        let outcomes = self
            .dispatcher
            .dispatch(&event.event_type, &event.payload)
            .await
            .map_err(|e| TransientError::new(format!("dispatch {}: {}", event.event_type, e)))?;

        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.endpoint_url.as_str())
            .collect();

        if !failed.is_empty() {
            // Redelivery retries every endpoint, including the ones that succeeded.
            return Err(TransientError::new(format!(
                "{} of {} webhook deliveries failed: {}",
                failed.len(),
                outcomes.len(),
                failed.join(", ")
            )));
        }

        debug!(event_type = %event.event_type, endpoints = outcomes.len(), "Event dispatched");
        Ok(())
    }
}
