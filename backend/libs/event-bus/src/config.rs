//! Bus configuration loaded from the environment.

use std::time::Duration;

use crate::error::{BusError, BusResult};
use crate::subjects;

/// Retention bounds of the durable stream.
///
/// Always explicit: the broker's unlimited defaults would let storage grow
/// without bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionLimits {
    pub max_age: Duration,
    pub max_bytes: i64,
    pub max_messages: i64,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 86400),
            max_bytes: 1024 * 1024 * 1024,
            max_messages: 1_000_000,
        }
    }
}

/// Broker connection and stream settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// NATS server URL (`NATS_URL`)
    pub url: String,
    /// Connection name shown in broker monitoring
    pub client_name: String,
    pub stream_name: String,
    pub stream_subjects: Vec<String>,
    pub retention: RetentionLimits,
    /// How long a publish waits for the stream ack
    pub publish_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "event-bus".to_string(),
            stream_name: subjects::STREAM_DOMAIN_EVENTS.to_string(),
            stream_subjects: subjects::default_stream_subjects(),
            retention: RetentionLimits::default(),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

impl BusConfig {
    /// Read bus settings from the environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `NATS_URL` | `nats://localhost:4222` |
    /// | `BUS_STREAM_NAME` | `DOMAIN_EVENTS` |
    /// | `BUS_STREAM_SUBJECTS` | `outbox.>,DOMAIN_EVENTS.>` |
    /// | `BUS_STREAM_MAX_AGE_SECS` | `604800` |
    /// | `BUS_STREAM_MAX_BYTES` | `1073741824` |
    /// | `BUS_STREAM_MAX_MSGS` | `1000000` |
    /// | `BUS_PUBLISH_TIMEOUT_SECS` | `5` |
    pub fn from_env(client_name: &str) -> BusResult<Self> {
        let defaults = Self::default();
        let retention = RetentionLimits {
            max_age: Duration::from_secs(env_parse(
                "BUS_STREAM_MAX_AGE_SECS",
                defaults.retention.max_age.as_secs(),
            )?),
            max_bytes: env_parse("BUS_STREAM_MAX_BYTES", defaults.retention.max_bytes)?,
            max_messages: env_parse("BUS_STREAM_MAX_MSGS", defaults.retention.max_messages)?,
        };

        if retention.max_age.is_zero() || retention.max_bytes <= 0 || retention.max_messages <= 0 {
            return Err(BusError::Config(
                "stream retention limits must all be positive".to_string(),
            ));
        }

        let stream_subjects = match std::env::var("BUS_STREAM_SUBJECTS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => defaults.stream_subjects,
        };

        Ok(Self {
            url: std::env::var("NATS_URL").unwrap_or(defaults.url),
            client_name: client_name.to_string(),
            stream_name: std::env::var("BUS_STREAM_NAME").unwrap_or(defaults.stream_name),
            stream_subjects,
            retention,
            publish_timeout: Duration::from_secs(env_parse(
                "BUS_PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout.as_secs(),
            )?),
        })
    }
}

/// Settings of one durable pull consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Durable group name shared by every replica of this consumer
    pub durable: String,
    pub filter_subject: String,
    pub batch_size: usize,
    /// Upper bound of one fetch when the stream is idle
    pub fetch_wait: Duration,
    /// Upper bound of processing one message
    pub process_timeout: Duration,
    /// Broker redelivers a message not dispositioned within this deadline
    pub ack_wait: Duration,
    /// Delivery attempts before the broker gives up (`-1` = unlimited)
    pub max_deliver: i64,
    /// Pause after a failed fetch
    pub error_backoff: Duration,
    /// Redelivery delay after the first Nak, doubled on every further attempt
    pub nak_delay: Duration,
    /// Upper bound of the Nak redelivery delay
    pub max_nak_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(durable: impl Into<String>, filter_subject: impl Into<String>) -> Self {
        Self {
            durable: durable.into(),
            filter_subject: filter_subject.into(),
            batch_size: 10,
            fetch_wait: Duration::from_secs(5),
            process_timeout: Duration::from_secs(30),
            ack_wait: Duration::from_secs(60),
            max_deliver: -1,
            error_backoff: Duration::from_secs(1),
            nak_delay: Duration::from_secs(1),
            max_nak_delay: Duration::from_secs(30),
        }
    }

    /// Delay requested with a Nak on the `delivery_count`-th attempt:
    /// `nak_delay * 2^(attempt - 1)`, capped at `max_nak_delay`.
    pub fn nak_delay_for(&self, delivery_count: u64) -> Duration {
        let doublings = delivery_count.saturating_sub(1).min(16) as u32;
        self.nak_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_nak_delay)
    }

    /// Apply `CONSUMER_BATCH_SIZE`, `CONSUMER_FETCH_WAIT_SECS`,
    /// `CONSUMER_PROCESS_TIMEOUT_SECS`, `CONSUMER_ACK_WAIT_SECS`,
    /// `CONSUMER_MAX_DELIVER`, `CONSUMER_NAK_DELAY_MS` and
    /// `CONSUMER_MAX_NAK_DELAY_SECS` overrides.
    pub fn with_env_overrides(mut self) -> BusResult<Self> {
        self.batch_size = env_parse("CONSUMER_BATCH_SIZE", self.batch_size)?;
        self.fetch_wait =
            Duration::from_secs(env_parse("CONSUMER_FETCH_WAIT_SECS", self.fetch_wait.as_secs())?);
        self.process_timeout = Duration::from_secs(env_parse(
            "CONSUMER_PROCESS_TIMEOUT_SECS",
            self.process_timeout.as_secs(),
        )?);
        self.ack_wait =
            Duration::from_secs(env_parse("CONSUMER_ACK_WAIT_SECS", self.ack_wait.as_secs())?);
        self.max_deliver = env_parse("CONSUMER_MAX_DELIVER", self.max_deliver)?;
        self.nak_delay = Duration::from_millis(env_parse(
            "CONSUMER_NAK_DELAY_MS",
            self.nak_delay.as_millis() as u64,
        )?);
        self.max_nak_delay = Duration::from_secs(env_parse(
            "CONSUMER_MAX_NAK_DELAY_SECS",
            self.max_nak_delay.as_secs(),
        )?);

        if self.batch_size == 0 {
            return Err(BusError::Config("CONSUMER_BATCH_SIZE must be > 0".to_string()));
        }
        if self.nak_delay > self.max_nak_delay {
            return Err(BusError::Config(format!(
                "nak delay ({:?}) must not exceed max nak delay ({:?})",
                self.nak_delay, self.max_nak_delay
            )));
        }
        if self.process_timeout >= self.ack_wait {
            return Err(BusError::Config(format!(
                "process timeout ({:?}) must be shorter than ack wait ({:?})",
                self.process_timeout, self.ack_wait
            )));
        }
        Ok(self)
    }
}

fn env_parse<T>(key: &str, default: T) -> BusResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| BusError::Config(format!("{}='{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retention_is_bounded() {
        let limits = RetentionLimits::default();
        assert_eq!(limits.max_age, Duration::from_secs(604_800));
        assert!(limits.max_bytes > 0);
        assert!(limits.max_messages > 0);
    }

    #[test]
    fn test_consumer_defaults() {
        let cfg = ConsumerConfig::new("audit-service-global", "DOMAIN_EVENTS.>");
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.fetch_wait, Duration::from_secs(5));
        assert!(cfg.process_timeout < cfg.ack_wait);
        assert_eq!(cfg.nak_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_nak_delay_grows_per_attempt_and_is_capped() {
        let cfg = ConsumerConfig::new("d", "DOMAIN_EVENTS.>");
        assert_eq!(cfg.nak_delay_for(0), Duration::from_secs(1));
        assert_eq!(cfg.nak_delay_for(1), Duration::from_secs(1));
        assert_eq!(cfg.nak_delay_for(2), Duration::from_secs(2));
        assert_eq!(cfg.nak_delay_for(4), Duration::from_secs(8));
        assert_eq!(cfg.nak_delay_for(6), Duration::from_secs(30));
        assert_eq!(cfg.nak_delay_for(u64::MAX), Duration::from_secs(30));
    }
}
