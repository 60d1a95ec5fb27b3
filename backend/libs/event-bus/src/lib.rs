//! # Event Bus
//!
//! Durable publish/subscribe plumbing shared by every service of the event
//! propagation pipeline:
//!
//! - **Stream provisioning**: [`ensure_stream`] idempotently creates the
//!   `DOMAIN_EVENTS` stream (file storage, explicit retention limits). Every
//!   process calls it at startup before publishing or subscribing; failure is
//!   fatal to startup.
//! - **Durable pull consumers**: [`PullConsumer`] fetches bounded batches from a
//!   named competing-consumer group and settles each message with exactly one
//!   [`Disposition`]: `Ack`, `Nak` (retry later) or `Term` (poison pill).
//! - **Publishing**: [`EventPublisher`] returns only after the broker stored the
//!   message.
//!
//! Delivery is at-least-once. Consumers make their effects idempotent by keying
//! them on the event id (`INSERT ... ON CONFLICT (event_id) DO NOTHING`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use event_bus::{
//!     ensure_stream, ConsumerConfig, BusConfig, NatsBus, PullConsumer, ShutdownController,
//! };
//! # use event_bus::{EventHandler, PoisonPill, TransientError};
//! # struct Handler;
//! # #[async_trait::async_trait]
//! # impl EventHandler for Handler {
//! #     type Event = ();
//! #     type Valid = ();
//! #     fn parse(&self, _: &str, _: &[u8]) -> Result<(), PoisonPill> { Ok(()) }
//! #     fn validate(&self, _: ()) -> Result<(), PoisonPill> { Ok(()) }
//! #     async fn apply(&self, _: ()) -> Result<(), TransientError> { Ok(()) }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = NatsBus::connect(BusConfig::from_env("audit-service")?).await?;
//! ensure_stream(&bus, &bus.stream_spec()).await?;
//!
//! let config = ConsumerConfig::new("audit-service-global", "DOMAIN_EVENTS.>");
//! let source = bus.pull_source(&config).await?;
//! let shutdown = ShutdownController::new();
//!
//! let consumer = PullConsumer::new(source, Arc::new(Handler), config);
//! let handle = tokio::spawn(consumer.run(shutdown.subscribe()));
//!
//! shutdown.trigger();
//! handle.await?;
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod disposition;
pub mod envelope;
mod error;
pub mod metrics;
pub mod nats;
pub mod publisher;
pub mod shutdown;
pub mod stream;
pub mod subjects;

pub use config::{BusConfig, ConsumerConfig, RetentionLimits};
pub use consumer::{ConsumerStats, Delivery, EventHandler, MessageSource, PullConsumer};
pub use disposition::{decide, Disposition, PoisonPill, TransientError};
pub use envelope::{optional_uuid, require_uuid, DomainEvent, InboundEvent};
pub use error::{BusError, BusResult};
pub use metrics::ConsumerMetrics;
pub use nats::{NatsBus, NatsDelivery, NatsPullSource};
pub use publisher::{publish_domain_event, EventPublisher};
pub use shutdown::{wait_for_signal, Shutdown, ShutdownController};
pub use stream::{ensure_stream, CreateOutcome, EnsureOutcome, StreamAdmin, StreamSpec};
