//! # CDC Worker
//!
//! Forwards committed `outbox_events` inserts from a PostgreSQL logical
//! replication slot (pgoutput) to the `DOMAIN_EVENTS` stream.
//!
//! - [`source`]: the slot as a peek/advance queue
//! - [`worker`]: decode, publish, confirm
//! - [`config`]: environment configuration

pub mod config;
pub mod metrics;
pub mod source;
pub mod worker;

pub use config::{Config, SubjectMode};
pub use metrics::CdcMetrics;
pub use source::{PgSlotSource, WalChange, WalSource};
pub use worker::{CdcWorker, PollOutcome, SubjectRouter};
