//! Event shapes that travel on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::disposition::PoisonPill;

/// Envelope published by services that emit domain events directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEvent {
    /// Deduplication identity of the event
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: None,
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }
}

/// Lenient view of anything a consumer may receive: the canonical CDC row
/// (`type`, `actor_id`) or the [`DomainEvent`] envelope (`event_type`,
/// `organization_id`). JSON `null` reads as an empty string.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    #[serde(default, alias = "event_id", deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub organization_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub aggregate_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub aggregate_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub event_type: String,
    /// Older producers name the event type `type`
    #[serde(default, rename = "type", deserialize_with = "null_as_empty")]
    pub legacy_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub actor_id: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InboundEvent {
    /// Parse a message body; any structural problem is a poison pill.
    pub fn parse(data: &[u8]) -> Result<Self, PoisonPill> {
        serde_json::from_slice(data).map_err(|e| PoisonPill::new(format!("unmarshal envelope: {}", e)))
    }

    /// `event_type` when present, else the legacy `type`.
    pub fn event_type(&self) -> &str {
        if self.event_type.is_empty() {
            &self.legacy_type
        } else {
            &self.event_type
        }
    }

    /// Event identity: the top-level id, or `event_id` inside the payload.
    pub fn event_id(&self) -> Option<String> {
        if !self.id.is_empty() {
            return Some(self.id.clone());
        }
        let payload = self.payload.as_ref()?;
        let value: serde_json::Value = serde_json::from_str(payload.get()).ok()?;
        value
            .get("event_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    /// Raw payload text, `null` when absent.
    pub fn payload_str(&self) -> &str {
        self.payload.as_ref().map(|p| p.get()).unwrap_or("null")
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a mandatory identifier field; empty or malformed is a poison pill.
pub fn require_uuid(field: &str, value: &str) -> Result<Uuid, PoisonPill> {
    if value.is_empty() {
        return Err(PoisonPill::new(format!("missing {}", field)));
    }
    Uuid::parse_str(value).map_err(|e| PoisonPill::new(format!("invalid {} {:?}: {}", field, value, e)))
}

/// Parse an optional identifier field; empty reads as `None`, malformed is a
/// poison pill.
pub fn optional_uuid(field: &str, value: &str) -> Result<Option<Uuid>, PoisonPill> {
    if value.is_empty() {
        return Ok(None);
    }
    require_uuid(field, value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cdc_row() {
        let event = InboundEvent::parse(
            br#"{"id":"e1","aggregate_type":"order","aggregate_id":"o1","actor_id":"u1","type":"Created","payload":{"a":1}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type(), "Created");
        assert_eq!(event.event_id().as_deref(), Some("e1"));
        assert_eq!(event.payload_str(), r#"{"a":1}"#);
        assert_eq!(event.organization_id, "");
    }

    #[test]
    fn test_parse_domain_event_envelope() {
        let org = Uuid::new_v4();
        let event = DomainEvent::new("consent", "c1", "consent.submitted", serde_json::json!({}))
            .with_organization(org);
        let bytes = serde_json::to_vec(&event).unwrap();

        let inbound = InboundEvent::parse(&bytes).unwrap();
        assert_eq!(inbound.event_type(), "consent.submitted");
        assert_eq!(inbound.organization_id, org.to_string());
        assert_eq!(inbound.event_id(), Some(event.id.to_string()));
        assert!(inbound.created_at.is_some());
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let event = InboundEvent::parse(br#"{"id":null,"actor_id":null,"payload":{"event_id":"p-7"}}"#)
            .unwrap();
        assert_eq!(event.actor_id, "");
        assert_eq!(event.event_id().as_deref(), Some("p-7"));
    }

    #[test]
    fn test_malformed_json_is_poison() {
        assert!(InboundEvent::parse(b"{not json").is_err());
        assert!(InboundEvent::parse(b"[1,2]").is_err());
    }

    #[test]
    fn test_uuid_helpers() {
        let id = Uuid::new_v4();
        assert_eq!(require_uuid("event_id", &id.to_string()).unwrap(), id);
        assert!(require_uuid("event_id", "").is_err());
        assert!(require_uuid("event_id", "not-a-uuid").is_err());
        assert_eq!(optional_uuid("organization_id", "").unwrap(), None);
        assert!(optional_uuid("organization_id", "zzz").is_err());
    }
}
