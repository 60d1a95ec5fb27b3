//! Durable pull consumer engine.
//!
//! Per delivery attempt a message moves `Fetched → Processing → {Acked | Nak'd | Terminated}`:
//!
//! 1. pull a bounded batch with a bounded wait (an empty batch is not an error);
//! 2. for each message, in order: parse, validate, apply;
//! 3. settle exactly once with the [`Disposition`] chosen by [`decide`].
//!
//! Messages of one batch are processed sequentially. Scale-out comes from
//! running more replicas on the same durable group, so no ordering holds across
//! messages; the handler's `apply` must be idempotent on the event identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::disposition::{decide, Disposition, PoisonPill, TransientError};
use crate::error::BusResult;
use crate::metrics::ConsumerMetrics;
use crate::shutdown::Shutdown;

/// One message handed out by the broker.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// 1 on first delivery.
    fn delivery_count(&self) -> u64 {
        1
    }

    /// Send the terminal disposition for this attempt. `nak_delay` is how
    /// long the broker holds a Nak'd message back; other dispositions ignore it.
    async fn settle(&self, disposition: Disposition, nak_delay: Duration) -> BusResult<()>;
}

/// Bounded batch fetch from a durable group.
#[async_trait]
pub trait MessageSource: Send {
    type Delivery: Delivery;

    /// Return up to `max` messages, waiting at most `wait`. Timing out with
    /// nothing available yields an empty batch.
    ///
    /// When `shutdown` fires the wait ends early and whatever was already
    /// received is returned, so every handed-out message gets settled.
    async fn fetch(
        &mut self,
        max: usize,
        wait: Duration,
        shutdown: &mut Shutdown,
    ) -> BusResult<Vec<Self::Delivery>>;
}

/// Business side of a consumer, split into the three stages the disposition
/// policy looks at.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Structurally parsed message
    type Event: Send;
    /// Message that passed domain validation
    type Valid: Send;

    fn parse(&self, subject: &str, payload: &[u8]) -> Result<Self::Event, PoisonPill>;

    fn validate(&self, event: Self::Event) -> Result<Self::Valid, PoisonPill>;

    /// Persist or forward the effect. Must be idempotent on the event identity.
    async fn apply(&self, valid: Self::Valid) -> Result<(), TransientError>;
}

/// Running totals of one consumer loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub fetched: u64,
    pub acked: u64,
    pub nacked: u64,
    pub terminated: u64,
    pub settle_errors: u64,
    pub fetch_errors: u64,
}

impl ConsumerStats {
    fn count(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Nak => self.nacked += 1,
            Disposition::Term => self.terminated += 1,
        }
    }
}

/// One durable consumer: a source, a handler and the loop that joins them.
pub struct PullConsumer<S, H> {
    source: S,
    handler: Arc<H>,
    config: ConsumerConfig,
    metrics: Option<ConsumerMetrics>,
    stats: ConsumerStats,
}

impl<S, H> PullConsumer<S, H>
where
    S: MessageSource,
    H: EventHandler,
{
    pub fn new(source: S, handler: Arc<H>, config: ConsumerConfig) -> Self {
        Self {
            source,
            handler,
            config,
            metrics: None,
            stats: ConsumerStats::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Run until `shutdown` fires.
    ///
    /// Shutdown is checked before every fetch and cuts the fetch wait short,
    /// so the loop exits within one `fetch_wait`. The fetch itself is never
    /// cancelled: messages it already received are returned and settled
    /// before the loop exits.
    pub async fn run(mut self, mut shutdown: Shutdown) -> ConsumerStats {
        info!(
            durable = %self.config.durable,
            subject = %self.config.filter_subject,
            batch_size = self.config.batch_size,
            fetch_wait_secs = self.config.fetch_wait.as_secs(),
            "Durable consumer started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let fetched = self
                .source
                .fetch(self.config.batch_size, self.config.fetch_wait, &mut shutdown)
                .await;

            match fetched {
                Ok(batch) if batch.is_empty() => {
                    debug!(durable = %self.config.durable, "No messages");
                }
                Ok(batch) => {
                    self.process_batch(batch).await;
                }
                Err(e) => {
                    self.stats.fetch_errors += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .fetch_errors
                            .with_label_values(&[&self.config.durable])
                            .inc();
                    }
                    error!(durable = %self.config.durable, error = %e, "Fetch failed");

                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(
            durable = %self.config.durable,
            acked = self.stats.acked,
            nacked = self.stats.nacked,
            terminated = self.stats.terminated,
            "Durable consumer stopped"
        );
        self.stats
    }

    /// Process and settle every message of one batch, in order.
    pub async fn process_batch(&mut self, batch: Vec<S::Delivery>) {
        self.stats.fetched += batch.len() as u64;
        for delivery in batch {
            let started = Instant::now();
            let disposition = self.process(&delivery).await;
            self.stats.count(disposition);

            if let Some(metrics) = &self.metrics {
                metrics.record(
                    &self.config.durable,
                    disposition,
                    started.elapsed().as_secs_f64(),
                );
            }

            let nak_delay = self.config.nak_delay_for(delivery.delivery_count());
            if disposition == Disposition::Nak {
                debug!(
                    durable = %self.config.durable,
                    delivery_count = delivery.delivery_count(),
                    nak_delay_ms = nak_delay.as_millis() as u64,
                    "Redelivery delayed"
                );
            }
            if let Err(e) = delivery.settle(disposition, nak_delay).await {
                // The broker redelivers after ack_wait; apply is idempotent.
                self.stats.settle_errors += 1;
                error!(
                    durable = %self.config.durable,
                    subject = %delivery.subject(),
                    disposition = %disposition,
                    error = %e,
                    "Failed to settle message"
                );
            }
        }
    }

    /// Run the three stages for one message and pick its disposition.
    pub async fn process(&self, delivery: &S::Delivery) -> Disposition {
        let subject = delivery.subject();

        let event = match self.handler.parse(subject, delivery.payload()) {
            Ok(event) => event,
            Err(poison) => {
                warn!(subject = %subject, reason = %poison.reason, "Terminating malformed message");
                return decide(Err(&poison), Ok(()), Ok(()));
            }
        };

        let valid = match self.handler.validate(event) {
            Ok(valid) => valid,
            Err(poison) => {
                warn!(subject = %subject, reason = %poison.reason, "Terminating invalid message");
                return decide(Ok(()), Err(&poison), Ok(()));
            }
        };

        let applied =
            match tokio::time::timeout(self.config.process_timeout, self.handler.apply(valid)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransientError::new(format!(
                    "processing exceeded {:?}",
                    self.config.process_timeout
                ))),
            };

        if let Err(transient) = &applied {
            error!(
                subject = %subject,
                delivery_count = delivery.delivery_count(),
                reason = %transient.reason,
                "Processing failed, message will be redelivered"
            );
        } else {
            debug!(subject = %subject, "Message processed");
        }

        decide(Ok(()), Ok(()), applied.as_ref().map(|_| ()))
    }
}
