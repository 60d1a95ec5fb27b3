//! Slot → decoder → bus → slot advance.
//!
//! The slot is the only cursor. Rows are published in WAL order and the slot
//! only moves past a transaction once every row in it was acknowledged by the
//! broker, so a crash or publish failure re-reads from the last confirmed
//! commit: at-least-once, never lost.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use cdc_replication::{pgoutput, Decoder, LogicalMessage, Lsn, OutboxRow};
use event_bus::subjects::{domain_subject, token};
use event_bus::{EventPublisher, Shutdown};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SubjectMode};
use crate::metrics::CdcMetrics;
use crate::source::WalSource;

/// Maps a decoded row onto its publish subject.
#[derive(Debug, Clone)]
pub struct SubjectRouter {
    producer: String,
    mode: SubjectMode,
}

impl SubjectRouter {
    pub fn new(producer: impl Into<String>, mode: SubjectMode) -> Self {
        Self {
            producer: producer.into(),
            mode,
        }
    }

    pub fn subject_for(&self, row: &OutboxRow) -> String {
        match self.mode {
            SubjectMode::Routed => domain_subject(&self.producer, &row.aggregate_type, &row.event_type),
            SubjectMode::Legacy => format!("outbox.{}", token(&self.producer)),
        }
    }
}

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// WAL messages read
    pub changes: usize,
    pub published: usize,
    /// Rows dropped because they could not be serialized
    pub skipped: usize,
    /// New confirmed position, if the slot moved
    pub advanced_to: Option<Lsn>,
    /// The poll stopped early and left changes for the next one
    pub stalled: bool,
}

impl PollOutcome {
    pub fn is_idle(&self) -> bool {
        self.changes == 0
    }
}

pub struct CdcWorker<W, P: ?Sized> {
    source: W,
    publisher: Arc<P>,
    decoder: Decoder,
    router: SubjectRouter,
    max_changes: i32,
    poll_interval: Duration,
    error_backoff: Duration,
    metrics: Option<CdcMetrics>,
}

impl<W, P> CdcWorker<W, P>
where
    W: WalSource,
    P: EventPublisher + ?Sized,
{
    pub fn new(source: W, publisher: Arc<P>, router: SubjectRouter) -> Self {
        Self {
            source,
            publisher,
            decoder: Decoder::new(),
            router,
            max_changes: 500,
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            metrics: None,
        }
    }

    pub fn from_config(source: W, publisher: Arc<P>, config: &Config) -> Self {
        let router = SubjectRouter::new(config.producer.clone(), config.subject_mode);
        let mut worker = Self::new(source, publisher, router);
        worker.max_changes = config.max_changes;
        worker.poll_interval = config.poll_interval;
        worker
    }

    pub fn with_metrics(mut self, metrics: CdcMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Poll until `shutdown` fires. Shutdown is honored between polls and
    /// interrupts the idle wait; a poll in progress runs to completion.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!(
            max_changes = self.max_changes,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "CDC worker started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let pause = match self.poll_once().await {
                Ok(outcome) if outcome.stalled => self.error_backoff,
                Ok(outcome) if outcome.is_idle() => self.poll_interval,
                Ok(outcome) => {
                    info!(
                        published = outcome.published,
                        skipped = outcome.skipped,
                        lsn = ?outcome.advanced_to.map(|l| l.to_string()),
                        "Forwarded outbox changes"
                    );
                    continue;
                }
                Err(e) => {
                    error!(error = ?e, "CDC poll failed");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("CDC worker stopped");
    }

    /// Read one window of changes, publish every decoded insert and advance the
    /// slot to the end of the last transaction that was fully published.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let changes = self.source.peek(self.max_changes).await?;
        let mut outcome = PollOutcome {
            changes: changes.len(),
            ..Default::default()
        };
        let mut confirmed: Option<Lsn> = None;

        for change in changes {
            let message = match pgoutput::parse(&change.data) {
                Ok(message) => message,
                Err(e) => {
                    error!(lsn = %change.lsn, error = %e, "Unreadable WAL message");
                    self.resync();
                    outcome.stalled = true;
                    break;
                }
            };

            if let LogicalMessage::Commit(commit) = &message {
                confirmed = Some(commit.end_lsn);
                continue;
            }

            let row = match self.decoder.apply(message) {
                None => continue,
                Some(Ok(row)) => row,
                Some(Err(e)) if e.requires_resync() => {
                    warn!(lsn = %change.lsn, error = %e, "Decoder out of sync, re-reading from slot position");
                    self.resync();
                    outcome.stalled = true;
                    break;
                }
                Some(Err(e)) => {
                    error!(lsn = %change.lsn, error = %e, "Dropping outbox row");
                    outcome.skipped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.skipped.inc();
                    }
                    continue;
                }
            };

            let body = match row.to_bytes() {
                Ok(body) => body,
                Err(e) => {
                    error!(event_id = %row.id, error = %e, "Dropping outbox row");
                    outcome.skipped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.skipped.inc();
                    }
                    continue;
                }
            };

            let subject = self.router.subject_for(&row);
            if let Err(e) = self.publisher.publish(&subject, Bytes::from(body)).await {
                error!(
                    event_id = %row.id,
                    subject = %subject,
                    error = %e,
                    "Publish failed, transaction will be re-read"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.publish_failures.inc();
                }
                outcome.stalled = true;
                break;
            }

            debug!(event_id = %row.id, subject = %subject, "Outbox event published");
            outcome.published += 1;
            if let Some(metrics) = &self.metrics {
                metrics.published.inc();
            }
        }

        if let Some(lsn) = confirmed {
            self.source.advance(lsn).await?;
            outcome.advanced_to = Some(lsn);
            if let Some(metrics) = &self.metrics {
                metrics.confirmed_lsn.set(lsn.0 as i64);
            }
        }

        Ok(outcome)
    }

    fn resync(&mut self) {
        self.decoder.reset();
        if let Some(metrics) = &self.metrics {
            metrics.resyncs.inc();
        }
    }
}
