pub mod event_consumer;
pub mod signature;
pub mod webhook_dispatcher;

pub use event_consumer::{WebhookEvent, WebhookEventHandler};
pub use signature::{sign, verify, SIGNATURE_HEADER};
pub use webhook_dispatcher::WebhookDispatcher;
