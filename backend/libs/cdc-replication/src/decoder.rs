//! Insert decoder: relation registry + tuple → canonical row.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{DecodeError, DecodeResult};
use crate::pgoutput::LogicalMessage;
use crate::relation::{RelationId, RelationRegistry, RelationSchema};
use crate::row::OutboxRow;
use crate::tuple::{ColumnValue, TupleColumn};

/// Decodes captured inserts for one replication session.
///
/// All methods take `&mut self` or `&self` on a value owned by the session's
/// task, so registry updates and decodes happen strictly in arrival order.
#[derive(Debug, Default)]
pub struct Decoder {
    relations: RelationRegistry,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a relation definition, replacing any earlier one for the same id.
    pub fn register_relation(&mut self, schema: RelationSchema) {
        debug!(
            table = %schema.qualified_name(),
            relation_id = schema.id,
            columns = schema.columns.len(),
            "Registered relation"
        );
        self.relations.register(schema);
    }

    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }

    /// Drop all known relations before restarting a decoding session.
    pub fn reset(&mut self) {
        self.relations.clear();
    }

    /// Decode a tuple into column name → value, keys lower-cased.
    ///
    /// Extra tuple positions beyond the registered schema are ignored.
    pub fn decode_values(
        &self,
        relation_id: RelationId,
        tuple: &[TupleColumn],
    ) -> DecodeResult<BTreeMap<String, ColumnValue>> {
        let schema = self
            .relations
            .get(relation_id)
            .ok_or(DecodeError::UnknownRelation(relation_id))?;

        Ok(schema
            .columns
            .iter()
            .zip(tuple)
            .map(|(col, datum)| (col.name.to_lowercase(), ColumnValue::from(datum)))
            .collect())
    }

    /// Decode an insert into its canonical row.
    pub fn decode_row(
        &self,
        relation_id: RelationId,
        tuple: &[TupleColumn],
    ) -> DecodeResult<OutboxRow> {
        let values = self.decode_values(relation_id, tuple)?;
        OutboxRow::from_values(&values)
    }

    /// Decode an insert and serialize the canonical row.
    pub fn decode_insert(
        &self,
        relation_id: RelationId,
        tuple: &[TupleColumn],
    ) -> DecodeResult<Vec<u8>> {
        let row = self.decode_row(relation_id, tuple)?;
        let data = row.to_bytes()?;

        debug!(
            id = %row.id,
            event_type = %row.event_type,
            aggregate_type = %row.aggregate_type,
            "Decoded insert"
        );

        Ok(data)
    }

    /// Route one logical message: relations are registered, inserts decoded.
    ///
    /// Returns `None` for messages that produce no row.
    pub fn apply(&mut self, message: LogicalMessage) -> Option<DecodeResult<OutboxRow>> {
        match message {
            LogicalMessage::Relation(schema) => {
                self.register_relation(schema);
                None
            }
            LogicalMessage::Insert(insert) => {
                Some(self.decode_row(insert.relation_id, &insert.tuple))
            }
            _ => None,
        }
    }
}
