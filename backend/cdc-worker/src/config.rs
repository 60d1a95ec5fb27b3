//! Configuration for the CDC worker.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use event_bus::BusConfig;

/// Where decoded rows are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectMode {
    /// `DOMAIN_EVENTS.<producer>.<aggregate>.<event>`
    Routed,
    /// `outbox.<producer>`, for consumers that predate routed subjects
    Legacy,
}

impl std::str::FromStr for SubjectMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "routed" => Ok(SubjectMode::Routed),
            "legacy" => Ok(SubjectMode::Legacy),
            other => bail!("unknown CDC_SUBJECT_MODE '{}' (expected routed or legacy)", other),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    /// Logical replication slot (pgoutput plugin)
    pub slot: String,
    /// Publication listing the outbox table
    pub publication: String,
    /// Producer token used in published subjects
    pub producer: String,
    pub subject_mode: SubjectMode,
    /// Pause between polls when the slot has nothing new
    pub poll_interval: Duration,
    /// Upper bound of changes read per poll
    pub max_changes: i32,
    pub bus: BusConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("slot", &self.slot)
            .field("publication", &self.publication)
            .field("producer", &self.producer)
            .field("subject_mode", &self.subject_mode)
            .field("poll_interval", &self.poll_interval)
            .field("max_changes", &self.max_changes)
            .field("bus", &self.bus)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

        let poll_interval_ms: u64 = std::env::var("CDC_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let max_changes: i32 = std::env::var("CDC_MAX_CHANGES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        if max_changes <= 0 {
            bail!("CDC_MAX_CHANGES must be > 0");
        }

        let subject_mode = std::env::var("CDC_SUBJECT_MODE")
            .unwrap_or_else(|_| "routed".to_string())
            .parse()?;

        Ok(Self {
            database_url,
            slot: std::env::var("CDC_SLOT").unwrap_or_else(|_| "outbox_slot".to_string()),
            publication: std::env::var("CDC_PUBLICATION")
                .unwrap_or_else(|_| "outbox_pub".to_string()),
            producer: std::env::var("CDC_PRODUCER").unwrap_or_else(|_| "outbox".to_string()),
            subject_mode,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_changes,
            bus: BusConfig::from_env("cdc-worker")?,
        })
    }
}
