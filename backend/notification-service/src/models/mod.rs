use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::value::RawValue;
use uuid::Uuid;

/// External endpoint subscribed to a set of event types. Read-only here.
#[derive(Clone)]
pub struct WebhookRegistration {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub endpoint_url: String,
    /// Shared HMAC secret
    pub secret: String,
    pub subscribed_events: Vec<String>,
    pub is_active: bool,
}

impl fmt::Debug for WebhookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRegistration")
            .field("id", &self.id)
            .field("organization_id", &self.organization_id)
            .field("endpoint_url", &self.endpoint_url)
            .field("secret", &"[REDACTED]")
            .field("subscribed_events", &self.subscribed_events)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl WebhookRegistration {
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.is_active && self.subscribed_events.iter().any(|e| e == event_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Result of one POST to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointOutcome {
    pub webhook_id: Uuid,
    pub endpoint_url: String,
    pub status: DeliveryStatus,
    /// Response status, when a response was received
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl EndpointOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}

/// Append-only record of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryLogEntry {
    pub organization_id: Option<Uuid>,
    pub delivery_type: String,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    pub fn webhook(hook: &WebhookRegistration, outcome: &EndpointOutcome) -> Self {
        Self {
            organization_id: hook.organization_id,
            delivery_type: "webhook".to_string(),
            recipient: hook.endpoint_url.clone(),
            status: outcome.status,
            error_message: outcome.error.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Body POSTed to every endpoint: `{"event", "payload", "timestamp"}`.
#[derive(Debug, Serialize)]
pub struct WebhookEnvelope<'a> {
    pub event: &'a str,
    pub payload: &'a RawValue,
    /// RFC 3339, UTC, second precision
    pub timestamp: String,
}

impl<'a> WebhookEnvelope<'a> {
    pub fn new(event: &'a str, payload: &'a RawValue) -> Self {
        Self {
            event,
            payload,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let payload = RawValue::from_string(r#"{"id":"e1"}"#.to_string()).unwrap();
        let envelope = WebhookEnvelope::new("privacy.consent.submitted", &payload);
        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["event"], "privacy.consent.submitted");
        assert_eq!(value["payload"]["id"], "e1");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_secret_is_not_printed() {
        let hook = WebhookRegistration {
            id: Uuid::new_v4(),
            organization_id: None,
            endpoint_url: "https://example.com/hook".to_string(),
            secret: "s3cr3t".to_string(),
            subscribed_events: vec!["a.b".to_string()],
            is_active: true,
        };
        assert!(!format!("{:?}", hook).contains("s3cr3t"));
        assert!(hook.subscribes_to("a.b"));
        assert!(!hook.subscribes_to("a.c"));
    }
}
