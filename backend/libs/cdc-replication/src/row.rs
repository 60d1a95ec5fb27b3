//! Canonical change row published for every captured outbox insert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DecodeError, DecodeResult};
use crate::tuple::ColumnValue;

/// Outbox column names, matched case-insensitively.
pub const COL_ID: &str = "id";
pub const COL_AGGREGATE_TYPE: &str = "aggregate_type";
pub const COL_AGGREGATE_ID: &str = "aggregate_id";
pub const COL_ACTOR_ID: &str = "actor_id";
pub const COL_TYPE: &str = "type";
pub const COL_PAYLOAD: &str = "payload";

/// One captured outbox insert, in the shape downstream consumers parse.
///
/// `payload` is embedded verbatim as JSON, so key order and number formatting of
/// the stored document survive the trip. A NULL payload serializes as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub actor_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Option<Box<RawValue>>,
}

impl OutboxRow {
    /// Build the row from a decoded column map whose keys are lower-cased.
    ///
    /// Missing or NULL text columns become empty strings.
    pub fn from_values(values: &BTreeMap<String, ColumnValue>) -> DecodeResult<Self> {
        let text = |key: &str| {
            values
                .get(key)
                .and_then(ColumnValue::as_text)
                .unwrap_or_default()
        };

        let id = text(COL_ID);
        let payload = match values.get(COL_PAYLOAD).and_then(ColumnValue::as_text) {
            Some(raw) if !raw.is_empty() => Some(
                RawValue::from_string(raw).map_err(|source| DecodeError::InvalidPayload {
                    event_id: id.clone(),
                    source,
                })?,
            ),
            _ => None,
        };

        Ok(Self {
            aggregate_type: text(COL_AGGREGATE_TYPE),
            aggregate_id: text(COL_AGGREGATE_ID),
            actor_id: text(COL_ACTOR_ID),
            event_type: text(COL_TYPE),
            id,
            payload,
        })
    }

    pub fn to_bytes(&self) -> DecodeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
