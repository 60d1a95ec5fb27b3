//! Immutable audit log persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::AuditResult;

/// One row of `audit_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub event_id: Uuid,
    pub organization_id: Option<Uuid>,
    /// Producing service, taken from the subject
    pub source_service: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Idempotent writer keyed on `event_id`.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Insert unless a row with the same `event_id` exists.
    ///
    /// Returns `true` when a row was written, `false` for a duplicate.
    async fn insert_if_absent(&self, entry: &AuditLog) -> AuditResult<bool>;
}

pub struct PgAuditLogStore {
    pool: PgPool,
}

impl PgAuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for PgAuditLogStore {
    async fn insert_if_absent(&self, entry: &AuditLog) -> AuditResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (
                event_id,
                organization_id,
                source_service,
                aggregate_type,
                aggregate_id,
                event_type,
                payload,
                actor_id,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(entry.event_id)
        .bind(entry.organization_id)
        .bind(&entry.source_service)
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.actor_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(event_id = %entry.event_id, "Audit log already recorded");
        }
        Ok(inserted)
    }
}
