//! Webhook registrations and delivery logs in PostgreSQL.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::DispatchResult;
use crate::models::{DeliveryLogEntry, WebhookRegistration};

#[async_trait]
pub trait WebhookDirectory: Send + Sync {
    /// Active registrations subscribed to `event_type`. Empty is not an error.
    async fn active_for_event(&self, event_type: &str) -> DispatchResult<Vec<WebhookRegistration>>;
}

#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn append(&self, entry: &DeliveryLogEntry) -> DispatchResult<()>;
}

pub struct PgWebhookDirectory {
    pool: PgPool,
}

impl PgWebhookDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookDirectory for PgWebhookDirectory {
    async fn active_for_event(&self, event_type: &str) -> DispatchResult<Vec<WebhookRegistration>> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, endpoint_url, secret_key, subscribed_events, is_active
            FROM webhooks
            WHERE is_active = TRUE
              AND $1 = ANY(subscribed_events)
            "#,
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(WebhookRegistration {
                    id: row.try_get("id")?,
                    organization_id: row.try_get("organization_id")?,
                    endpoint_url: row.try_get("endpoint_url")?,
                    secret: row.try_get("secret_key")?,
                    subscribed_events: row.try_get("subscribed_events")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }
}

pub struct PgDeliveryLog {
    pool: PgPool,
}

impl PgDeliveryLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLog for PgDeliveryLog {
    async fn append(&self, entry: &DeliveryLogEntry) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_logs (
                organization_id,
                delivery_type,
                recipient,
                status,
                error_message,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.organization_id)
        .bind(&entry.delivery_type)
        .bind(&entry.recipient)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
