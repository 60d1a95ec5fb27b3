//! Convenience macros for working with the outbox.

/// Write an event to the outbox within a transaction.
///
/// # Usage
///
/// ```rust,no_run
/// use transactional_outbox::{publish_event, SqlxOutboxRepository};
/// use sqlx::PgPool;
/// use uuid::Uuid;
/// use serde_json::json;
///
/// # async fn example(pool: PgPool, repo: SqlxOutboxRepository) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = pool.begin().await?;
/// let item_id = Uuid::new_v4();
///
/// sqlx::query("INSERT INTO items (id, name) VALUES ($1, $2)")
///     .bind(item_id)
///     .bind("Widget")
///     .execute(&mut *tx)
///     .await?;
///
/// publish_event!(&mut tx, &repo, "item", item_id, "item_created", json!({ "name": "Widget" }))?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Arguments
///
/// * `$tx` - Mutable reference to database transaction
/// * `$repo` - Reference to an `OutboxRepository` implementation
/// * `$aggregate_type` - Type of aggregate (e.g., "item")
/// * `$aggregate_id` - Anything `Display`, stored as text
/// * `$event_type` - Event type string (e.g., "item_created")
/// * `$payload` - JSON-serializable payload
///
/// An optional trailing `actor = $actor` argument sets `actor_id`.
///
/// Evaluates to `OutboxResult<()>`.
#[macro_export]
macro_rules! publish_event {
    ($tx:expr, $repo:expr, $aggregate_type:expr, $aggregate_id:expr, $event_type:expr, $payload:expr) => {{
        use $crate::OutboxRepository as _;

        match serde_json::to_value($payload) {
            Ok(payload) => {
                let record = $crate::OutboxRecord::new(
                    $aggregate_type,
                    $aggregate_id.to_string(),
                    $event_type,
                    payload,
                );
                $repo.insert($tx, &record).await
            }
            Err(e) => Err($crate::OutboxError::from(e)),
        }
    }};
    ($tx:expr, $repo:expr, $aggregate_type:expr, $aggregate_id:expr, $event_type:expr, $payload:expr, actor = $actor:expr) => {{
        use $crate::OutboxRepository as _;

        match serde_json::to_value($payload) {
            Ok(payload) => {
                let record = $crate::OutboxRecord::new(
                    $aggregate_type,
                    $aggregate_id.to_string(),
                    $event_type,
                    payload,
                )
                .with_actor($actor);
                $repo.insert($tx, &record).await
            }
            Err(e) => Err($crate::OutboxError::from(e)),
        }
    }};
}
