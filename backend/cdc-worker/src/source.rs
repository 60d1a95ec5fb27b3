//! Reading committed changes from a logical replication slot.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use cdc_replication::Lsn;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

/// One pgoutput message and the WAL position it was read at.
#[derive(Debug, Clone)]
pub struct WalChange {
    pub lsn: Lsn,
    pub data: Bytes,
}

/// Replication slot seen as a re-readable queue.
///
/// `peek` does not consume: the same changes come back until `advance` moves
/// the slot's confirmed position past them.
#[async_trait]
pub trait WalSource: Send {
    async fn peek(&mut self, max_changes: i32) -> Result<Vec<WalChange>>;

    async fn advance(&mut self, to: Lsn) -> Result<()>;
}

/// [`WalSource`] over the SQL replication functions of PostgreSQL.
pub struct PgSlotSource {
    pool: PgPool,
    slot: String,
    publication: String,
}

impl PgSlotSource {
    pub fn new(pool: PgPool, slot: impl Into<String>, publication: impl Into<String>) -> Self {
        Self {
            pool,
            slot: slot.into(),
            publication: publication.into(),
        }
    }

    /// Create the slot unless it already exists. Returns `true` when created.
    pub async fn ensure_slot(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)",
        )
        .bind(&self.slot)
        .fetch_one(&self.pool)
        .await
        .context("Failed to look up replication slot")?;

        if exists {
            info!(slot = %self.slot, "Replication slot exists");
            return Ok(false);
        }

        let created = sqlx::query("SELECT pg_create_logical_replication_slot($1, 'pgoutput')")
            .bind(&self.slot)
            .execute(&self.pool)
            .await;

        match created {
            Ok(_) => {
                info!(slot = %self.slot, "Replication slot created");
                Ok(true)
            }
            // duplicate_object: another replica created it between the two statements
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("42710") => {
                info!(slot = %self.slot, "Replication slot created concurrently");
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to create replication slot"),
        }
    }
}

#[async_trait]
impl WalSource for PgSlotSource {
    async fn peek(&mut self, max_changes: i32) -> Result<Vec<WalChange>> {
        let rows = sqlx::query(
            r#"
            SELECT lsn::text AS lsn, data
            FROM pg_logical_slot_peek_binary_changes(
                $1, NULL, $2,
                'proto_version', '1',
                'publication_names', $3
            )
            "#,
        )
        .bind(&self.slot)
        .bind(max_changes)
        .bind(&self.publication)
        .fetch_all(&self.pool)
        .await
        .context("Failed to peek replication slot")?;

        let changes = rows
            .into_iter()
            .map(|row| {
                let lsn: String = row.try_get("lsn")?;
                let data: Vec<u8> = row.try_get("data")?;
                Ok(WalChange {
                    lsn: Lsn::from_str(&lsn)?,
                    data: Bytes::from(data),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(slot = %self.slot, changes = changes.len(), "Peeked slot");
        Ok(changes)
    }

    async fn advance(&mut self, to: Lsn) -> Result<()> {
        sqlx::query("SELECT pg_replication_slot_advance($1, $2::pg_lsn)")
            .bind(&self.slot)
            .bind(to.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to advance replication slot")?;

        debug!(slot = %self.slot, lsn = %to, "Slot advanced");
        Ok(())
    }
}
