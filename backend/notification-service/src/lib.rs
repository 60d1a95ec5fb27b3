//! Notification service: forwards domain events to customer webhooks.
//!
//! Every event on `DOMAIN_EVENTS.>` is resolved against the active webhook
//! registrations for its type. Each endpoint receives the same signed JSON
//! envelope and every attempt is written to the delivery log. Any failed
//! endpoint Naks the message, so the whole fan-out is retried.

pub mod config;
mod error;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;

pub use config::{Config, WEBHOOK_DURABLE};
pub use error::{DispatchError, DispatchResult};
pub use models::{
    DeliveryLogEntry, DeliveryStatus, EndpointOutcome, WebhookEnvelope, WebhookRegistration,
};
pub use repository::{DeliveryLog, PgDeliveryLog, PgWebhookDirectory, WebhookDirectory};
pub use services::{sign, verify, WebhookDispatcher, WebhookEvent, WebhookEventHandler, SIGNATURE_HEADER};
