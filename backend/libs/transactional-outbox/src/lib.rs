//! # Transactional Outbox (producer side)
//!
//! A service that changes business state also writes one row to
//! `outbox_events` **in the same database transaction**. Nothing in the service
//! publishes to the broker: the `cdc-worker` reads committed inserts from the
//! write-ahead log and forwards them, so an event exists if and only if its
//! transaction committed.
//!
//! The row layout is the canonical change row the decoder emits:
//!
//! | column | type | notes |
//! |---|---|---|
//! | `id` | `uuid` | event identity, consumers deduplicate on it |
//! | `aggregate_type` | `text` | e.g. `order` |
//! | `aggregate_id` | `text` | |
//! | `actor_id` | `uuid NULL` | who caused the change |
//! | `type` | `text` | e.g. `order_created` |
//! | `payload` | `jsonb` | |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transactional_outbox::{OutboxRecord, OutboxRepository, SqlxOutboxRepository};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! async fn create_order(
//!     pool: &PgPool,
//!     outbox: &SqlxOutboxRepository,
//!     actor: Uuid,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     let order_id = Uuid::new_v4();
//!     sqlx::query("INSERT INTO orders (id, total) VALUES ($1, $2)")
//!         .bind(order_id)
//!         .bind(10_i64)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     let record = OutboxRecord::new(
//!         "order",
//!         order_id.to_string(),
//!         "order_created",
//!         serde_json::json!({ "total": 10 }),
//!     )
//!     .with_actor(actor);
//!     outbox.insert(&mut tx, &record).await?;
//!
//!     // Both rows become visible, and the event is emitted, only on commit.
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info};
use uuid::Uuid;

mod error;
pub mod macros;

pub use error::{OutboxError, OutboxResult};

/// One row of `outbox_events`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxRecord {
    /// Unique identifier for this event
    pub id: Uuid,

    /// Type of aggregate this event relates to (e.g., "order", "item")
    pub aggregate_type: String,

    /// ID of the entity this event relates to
    pub aggregate_id: String,

    /// User that caused the change, if any
    pub actor_id: Option<Uuid>,

    /// Event type (e.g., "order_created")
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload as JSON
    pub payload: serde_json::Value,
}

impl OutboxRecord {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            actor_id: None,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Reject records that downstream routing could not place on a subject.
    pub fn validate(&self) -> OutboxResult<()> {
        if self.id.is_nil() {
            return Err(OutboxError::InvalidRecord("event id is nil".to_string()));
        }
        if self.aggregate_type.trim().is_empty() {
            return Err(OutboxError::InvalidRecord(
                "aggregate_type is empty".to_string(),
            ));
        }
        if self.event_type.trim().is_empty() {
            return Err(OutboxError::InvalidRecord("event type is empty".to_string()));
        }
        Ok(())
    }
}

/// Writes outbox rows.
///
/// Implementations MUST write inside the caller's transaction: the insert is
/// only meaningful when it commits or rolls back together with the business
/// change.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &OutboxRecord,
    ) -> OutboxResult<()>;
}

/// PostgreSQL implementation of [`OutboxRepository`].
pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows created before `ts`.
    ///
    /// Rows are never read back by the pipeline once their insert is in the
    /// WAL, so the table can be trimmed on any schedule that exceeds the
    /// replication lag.
    pub async fn purge_before(&self, ts: DateTime<Utc>) -> OutboxResult<u64> {
        let res = sqlx::query("DELETE FROM outbox_events WHERE created_at < $1")
            .bind(ts)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(before = %ts, error = %e, "Failed to purge outbox events");
                e
            })?;

        info!(deleted = res.rows_affected(), before = %ts, "Purged outbox events");
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &OutboxRecord,
    ) -> OutboxResult<()> {
        record.validate()?;

        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id,
                aggregate_type,
                aggregate_id,
                actor_id,
                type,
                payload
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.aggregate_type)
        .bind(&record.aggregate_id)
        .bind(record.actor_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!(
                event_id = %record.id,
                event_type = %record.event_type,
                error = %e,
                "Failed to insert event into outbox"
            );
            e
        })?;

        debug!(
            event_id = %record.id,
            event_type = %record.event_type,
            aggregate_id = %record.aggregate_id,
            "Event inserted into outbox"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_as_change_row() {
        let actor = Uuid::new_v4();
        let record =
            OutboxRecord::new("order", "42", "order_created", json!({"total": 10})).with_actor(actor);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "order_created");
        assert_eq!(value["aggregate_id"], "42");
        assert_eq!(value["actor_id"], actor.to_string());
        assert_eq!(value["payload"], json!({"total": 10}));
        assert!(value.get("event_type").is_none());
    }

    #[test]
    fn test_validate_rejects_unroutable_records() {
        let ok = OutboxRecord::new("order", "42", "order_created", json!({}));
        assert!(ok.validate().is_ok());

        let mut no_type = ok.clone();
        no_type.event_type = "  ".to_string();
        assert!(matches!(no_type.validate(), Err(OutboxError::InvalidRecord(_))));

        let mut no_aggregate = ok.clone();
        no_aggregate.aggregate_type.clear();
        assert!(no_aggregate.validate().is_err());

        let mut nil = ok;
        nil.id = Uuid::nil();
        assert!(nil.validate().is_err());
    }

    #[test]
    fn test_error_classification() {
        assert!(OutboxError::DatabaseError(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!OutboxError::DatabaseError(sqlx::Error::RowNotFound).is_transient());
        assert!(!OutboxError::InvalidRecord("x".to_string()).is_transient());
    }
}
