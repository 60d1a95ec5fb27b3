//! NATS JetStream implementation of the bus traits.

use std::future::IntoFuture;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer as JetStreamPullConsumer},
    context::{CreateStreamErrorKind, GetStreamErrorKind},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, ErrorCode,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{BusConfig, ConsumerConfig};
use crate::consumer::{Delivery, MessageSource};
use crate::disposition::Disposition;
use crate::error::{BusError, BusResult};
use crate::publisher::EventPublisher;
use crate::shutdown::Shutdown;
use crate::stream::{CreateOutcome, StreamAdmin, StreamSpec};

/// Connection to NATS plus its JetStream context.
///
/// Created once at process start and passed to every component that needs the
/// broker. Call [`NatsBus::close`] on shutdown to flush pending publishes.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BusConfig,
}

impl NatsBus {
    pub async fn connect(config: BusConfig) -> BusResult<Self> {
        info!(url = %config.url, client = %config.client_name, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(Duration::from_secs(5))
            .connect(config.url.as_str())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());
        info!("NATS JetStream connected");

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Stream spec derived from this connection's configuration.
    pub fn stream_spec(&self) -> StreamSpec {
        StreamSpec::from_config(&self.config)
    }

    /// Bind to the durable group, creating it on first use.
    ///
    /// Every replica passing the same durable name shares one group and the
    /// broker load-balances messages across them.
    pub async fn pull_source(&self, consumer: &ConsumerConfig) -> BusResult<NatsPullSource> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| {
                BusError::Subscribe(format!("stream '{}': {}", self.config.stream_name, e))
            })?;

        let pull_consumer: JetStreamPullConsumer = stream
            .get_or_create_consumer(
                &consumer.durable,
                pull::Config {
                    durable_name: Some(consumer.durable.clone()),
                    filter_subject: consumer.filter_subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: consumer.ack_wait,
                    max_deliver: consumer.max_deliver,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("durable '{}': {}", consumer.durable, e)))?;

        info!(
            stream = %self.config.stream_name,
            durable = %consumer.durable,
            subject = %consumer.filter_subject,
            "Durable pull consumer bound"
        );

        Ok(NatsPullSource {
            consumer: pull_consumer,
        })
    }

    /// Flush buffered publishes before the connection is dropped.
    pub async fn close(&self) -> BusResult<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StreamAdmin for NatsBus {
    async fn stream_exists(&self, name: &str) -> BusResult<bool> {
        match self.jetstream.get_stream(name).await {
            Ok(_) => Ok(true),
            Err(e) => match e.kind() {
                GetStreamErrorKind::JetStream(js) if js.error_code() == ErrorCode::STREAM_NOT_FOUND => {
                    Ok(false)
                }
                _ => Err(BusError::Provision {
                    stream: name.to_string(),
                    reason: format!("stream info: {}", e),
                }),
            },
        }
    }

    async fn create_stream(&self, spec: &StreamSpec) -> BusResult<CreateOutcome> {
        let config = StreamConfig {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
            storage: StorageType::File,
            retention: RetentionPolicy::Limits,
            max_age: spec.retention.max_age,
            max_bytes: spec.retention.max_bytes,
            max_messages: spec.retention.max_messages,
            ..Default::default()
        };

        match self.jetstream.create_stream(config).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) => match e.kind() {
                CreateStreamErrorKind::JetStream(js)
                    if js.error_code() == ErrorCode::STREAM_NAME_EXIST =>
                {
                    warn!(stream = %spec.name, "Stream already exists (created concurrently)");
                    Ok(CreateOutcome::AlreadyExists)
                }
                _ => Err(BusError::Provision {
                    stream: spec.name.clone(),
                    reason: format!("create stream: {}", e),
                }),
            },
        }
    }
}

#[async_trait]
impl EventPublisher for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> BusResult<()> {
        self.stream_spec().check_covers(subject)?;

        let size = payload.len();
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        tokio::time::timeout(self.config.publish_timeout, ack.into_future())
            .await
            .map_err(|_| {
                BusError::Publish(format!(
                    "no ack for '{}' within {:?}",
                    subject, self.config.publish_timeout
                ))
            })?
            .map_err(|e| BusError::Publish(e.to_string()))?;

        debug!(subject = %subject, bytes = size, "Published to JetStream");
        Ok(())
    }
}

/// Pull source bound to one durable group.
pub struct NatsPullSource {
    consumer: JetStreamPullConsumer,
}

#[async_trait]
impl MessageSource for NatsPullSource {
    type Delivery = NatsDelivery;

    async fn fetch(
        &mut self,
        max: usize,
        wait: Duration,
        shutdown: &mut Shutdown,
    ) -> BusResult<Vec<NatsDelivery>> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(max)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;

        let mut deliveries = Vec::with_capacity(max);
        loop {
            let next = tokio::select! {
                next = batch.next() => next,
                _ = shutdown.recv() => {
                    debug!(received = deliveries.len(), "Fetch cut short by shutdown");
                    break;
                }
            };

            match next {
                None => break,
                Some(Ok(message)) => deliveries.push(NatsDelivery { message }),
                Some(Err(e)) if deliveries.is_empty() => {
                    return Err(BusError::Fetch(e.to_string()))
                }
                Some(Err(e)) => {
                    // Keep what arrived; those messages still need settling.
                    warn!(error = %e, received = deliveries.len(), "Batch ended early");
                    break;
                }
            }
        }
        Ok(deliveries)
    }
}

/// One JetStream message awaiting its disposition.
pub struct NatsDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn subject(&self) -> &str {
        self.message.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.message.payload
    }

    fn delivery_count(&self) -> u64 {
        self.message
            .info()
            .map(|info| info.delivered.max(1) as u64)
            .unwrap_or(1)
    }

    async fn settle(&self, disposition: Disposition, nak_delay: Duration) -> BusResult<()> {
        self.message
            .ack_with(ack_kind(disposition, nak_delay))
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}

/// JetStream acknowledgement for a disposition. A Nak always carries a delay:
/// without one the broker redelivers immediately.
fn ack_kind(disposition: Disposition, nak_delay: Duration) -> AckKind {
    match disposition {
        Disposition::Ack => AckKind::Ack,
        Disposition::Nak => AckKind::Nak(Some(nak_delay)),
        Disposition::Term => AckKind::Term,
    }
}
