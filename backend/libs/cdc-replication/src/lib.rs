//! # CDC Replication Decoding
//!
//! Turns `pgoutput` logical replication messages into canonical outbox change
//! rows, the first hop of the event propagation pipeline:
//!
//! ```text
//! business tx ──► outbox_events row ──► WAL ──► pgoutput ──► Decoder ──► OutboxRow bytes ──► bus
//! ```
//!
//! The decoder is a pure function of (relation registry, tuple). It holds no
//! broker or transport types so it can be driven from any WAL reader and tested
//! without a database.
//!
//! ## Protocol contract
//!
//! Within a decoding session the upstream sends a `Relation` message before the
//! first data message that references it. An insert for an unseen relation id
//! therefore fails with [`DecodeError::UnknownRelation`] instead of guessing a
//! column layout; the caller must restart the session to resynchronize.
//!
//! ## Example
//!
//! ```rust
//! use cdc_replication::{Decoder, RelationSchema, TupleColumn};
//!
//! let mut decoder = Decoder::new();
//! decoder.register_relation(RelationSchema::from_names(
//!     16384,
//!     "outbox_events",
//!     ["id", "aggregate_type", "aggregate_id", "actor_id", "type", "payload"],
//! ));
//!
//! let tuple: Vec<_> = ["e1", "order", "o1", "u1", "Created", "{}"]
//!     .into_iter()
//!     .map(TupleColumn::text)
//!     .collect();
//! let bytes = decoder.decode_insert(16384, &tuple).unwrap();
//! assert!(bytes.starts_with(br#"{"id":"e1""#));
//! ```

mod decoder;
mod error;
pub mod lsn;
pub mod pgoutput;
pub mod relation;
pub mod row;
pub mod tuple;

pub use decoder::Decoder;
pub use error::{DecodeError, DecodeResult};
pub use lsn::Lsn;
pub use pgoutput::LogicalMessage;
pub use relation::{ColumnDef, RelationId, RelationRegistry, RelationSchema};
pub use row::OutboxRow;
pub use tuple::{ColumnValue, TupleColumn};
