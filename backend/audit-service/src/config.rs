use std::fmt;

use anyhow::{Context, Result};
use event_bus::subjects::SUBJECT_DOMAIN_EVENTS;
use event_bus::{BusConfig, ConsumerConfig};

/// Durable group shared by every audit-service replica.
pub const GLOBAL_DURABLE: &str = "audit-service-global";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bus: BusConfig,
    pub consumer: ConsumerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("bus", &self.bus)
            .field("consumer", &self.consumer)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let mut consumer = ConsumerConfig::new(GLOBAL_DURABLE, SUBJECT_DOMAIN_EVENTS);
        consumer.batch_size = 20;

        Ok(Self {
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            bus: BusConfig::from_env("audit-service")?,
            consumer: consumer.with_env_overrides()?,
        })
    }
}
