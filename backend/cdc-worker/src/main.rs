use std::sync::Arc;

use anyhow::{Context, Result};
use cdc_worker::{CdcMetrics, CdcWorker, Config, PgSlotSource};
use event_bus::{ensure_stream, wait_for_signal, NatsBus, ShutdownController};
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
    tracing::info!(?config, "Starting cdc-worker");

    let bus = NatsBus::connect(config.bus.clone())
        .await
        .context("NATS connection failed")?;
    ensure_stream(&bus, &bus.stream_spec())
        .await
        .context("NATS stream provisioning failed")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let source = PgSlotSource::new(pool.clone(), config.slot.clone(), config.publication.clone());
    source.ensure_slot().await?;

    let bus = Arc::new(bus);
    let worker = CdcWorker::from_config(source, bus.clone(), &config)
        .with_metrics(CdcMetrics::new("cdc-worker"));

    let shutdown = ShutdownController::new();
    let handle = tokio::spawn(worker.run(shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();

    if let Err(e) = handle.await {
        tracing::error!("CDC worker task failed: {}", e);
    }

    bus.close().await?;
    pool.close().await;
    tracing::info!("cdc-worker stopped");
    Ok(())
}
