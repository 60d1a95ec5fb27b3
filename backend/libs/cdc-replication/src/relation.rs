//! In-memory relation schema registry.
//!
//! One registry belongs to exactly one replication session. It is never shared
//! or persisted: the upstream resends relation definitions at the start of every
//! decoding session, before the first data message that needs them.

use std::collections::HashMap;

/// Relation OID as sent on the wire.
pub type RelationId = u32;

/// One column of a relation definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub type_oid: u32,
    /// `1` marks the column as part of the replica identity key.
    pub flags: u8,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_oid: 0,
            flags: 0,
        }
    }
}

/// Definition of a relation as last announced by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSchema {
    pub id: RelationId,
    pub namespace: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl RelationSchema {
    /// Build a schema from bare column names (namespace `public`).
    pub fn from_names<I, S>(id: RelationId, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            namespace: "public".to_string(),
            name: name.into(),
            columns: columns.into_iter().map(ColumnDef::new).collect(),
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Relation id → schema, last write wins.
#[derive(Debug, Default)]
pub struct RelationRegistry {
    relations: HashMap<RelationId, RelationSchema>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any prior schema for this relation id.
    pub fn register(&mut self, schema: RelationSchema) -> Option<RelationSchema> {
        self.relations.insert(schema.id, schema)
    }

    pub fn get(&self, id: RelationId) -> Option<&RelationSchema> {
        self.relations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Forget every schema. Used when the session is restarted for resync.
    pub fn clear(&mut self) {
        self.relations.clear();
    }
}
