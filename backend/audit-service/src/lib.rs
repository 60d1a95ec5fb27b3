//! Audit service: persists every domain event on the platform as an immutable
//! audit log row.
//!
//! One durable group (`audit-service-global`) reads `DOMAIN_EVENTS.>`. Rows are
//! keyed on the event id and written with `ON CONFLICT (event_id) DO NOTHING`,
//! so redelivery after a lost ack leaves exactly one row.

pub mod config;
mod error;
pub mod handler;
pub mod store;

pub use config::{Config, GLOBAL_DURABLE};
pub use error::{AuditError, AuditResult};
pub use handler::{AuditCandidate, AuditEventHandler};
pub use store::{AuditLog, AuditLogStore, PgAuditLogStore};
