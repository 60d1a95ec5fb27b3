//! Publishing side of the bus.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::envelope::DomainEvent;
use crate::error::BusResult;
use crate::subjects::domain_subject;

/// Durable publish: returns only after the broker has stored the message.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> BusResult<()>;
}

/// Publish a [`DomainEvent`] on its routed subject and return that subject.
pub async fn publish_domain_event<P>(
    publisher: &P,
    producer: &str,
    event: &DomainEvent,
) -> BusResult<String>
where
    P: EventPublisher + ?Sized,
{
    let subject = domain_subject(producer, &event.aggregate_type, &event.event_type);
    let body = serde_json::to_vec(event)?;
    publisher.publish(&subject, Bytes::from(body)).await?;
    debug!(event_id = %event.id, subject = %subject, "Domain event published");
    Ok(subject)
}
