use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use event_bus::subjects::SUBJECT_DOMAIN_EVENTS;
use event_bus::{BusConfig, ConsumerConfig};

/// Durable group shared by every notification-service replica.
pub const WEBHOOK_DURABLE: &str = "notification-event-consumer";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Per-attempt HTTP timeout for webhook delivery
    pub webhook_timeout: Duration,
    pub bus: BusConfig,
    pub consumer: ConsumerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("webhook_timeout", &self.webhook_timeout)
            .field("bus", &self.bus)
            .field("consumer", &self.consumer)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let webhook_timeout_secs: u64 = std::env::var("WEBHOOK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("WEBHOOK_TIMEOUT_SECS must be an integer")?;

        Ok(Self {
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            webhook_timeout: Duration::from_secs(webhook_timeout_secs),
            bus: BusConfig::from_env("notification-service")?,
            consumer: ConsumerConfig::new(WEBHOOK_DURABLE, SUBJECT_DOMAIN_EVENTS)
                .with_env_overrides()?,
        })
    }
}
