use std::sync::Arc;

use anyhow::{Context, Result};
use audit_service::{AuditEventHandler, Config, PgAuditLogStore};
use event_bus::{
    ensure_stream, wait_for_signal, ConsumerMetrics, NatsBus, PullConsumer, ShutdownController,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(?config, "Starting audit-service");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let bus = NatsBus::connect(config.bus.clone())
        .await
        .context("NATS connection failed")?;
    ensure_stream(&bus, &bus.stream_spec())
        .await
        .context("NATS stream provisioning failed")?;

    let source = bus.pull_source(&config.consumer).await?;
    let handler = Arc::new(AuditEventHandler::new(Arc::new(PgAuditLogStore::new(
        pool.clone(),
    ))));
    let consumer = PullConsumer::new(source, handler, config.consumer.clone())
        .with_metrics(ConsumerMetrics::new("audit-service"));

    let shutdown = ShutdownController::new();
    let handle = tokio::spawn(consumer.run(shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutdown signal received, draining in-flight batch");
    shutdown.trigger();

    match handle.await {
        Ok(stats) => tracing::info!(?stats, "Audit consumer stopped"),
        Err(e) => tracing::error!("Audit consumer task failed: {}", e),
    }

    bus.close().await?;
    pool.close().await;
    Ok(())
}
