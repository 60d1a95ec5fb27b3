//! In-memory broker and handler used by the consumer tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use event_bus::{
    require_uuid, BusError, BusResult, Delivery, Disposition, EventHandler, InboundEvent,
    MessageSource, PoisonPill, Shutdown, TransientError,
};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub delivered: u64,
}

/// Queue shared by the source and its deliveries. A Nak puts the message back.
#[derive(Default, Clone)]
pub struct FakeBroker {
    queue: Arc<Mutex<VecDeque<StoredMessage>>>,
    settlements: Arc<Mutex<Vec<(String, Disposition)>>>,
    nak_delays: Arc<Mutex<Vec<Duration>>>,
    fail_fetches: Arc<AtomicUsize>,
}

impl FakeBroker {
    pub fn publish(&self, subject: &str, payload: &str) {
        self.queue.lock().unwrap().push_back(StoredMessage {
            subject: subject.to_string(),
            payload: payload.as_bytes().to_vec(),
            delivered: 0,
        });
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Payloads with the disposition each delivery attempt received.
    pub fn settlements(&self) -> Vec<(String, Disposition)> {
        self.settlements.lock().unwrap().clone()
    }

    /// Delay requested by every Nak, in order.
    pub fn nak_delays(&self) -> Vec<Duration> {
        self.nak_delays.lock().unwrap().clone()
    }

    /// Take up to `max` queued messages, counting the delivery attempt.
    pub fn take(&self, max: usize) -> Vec<FakeDelivery> {
        let mut queue = self.queue.lock().unwrap();
        let take = max.min(queue.len());
        queue
            .drain(..take)
            .map(|mut message| {
                message.delivered += 1;
                FakeDelivery {
                    message,
                    broker: self.clone(),
                }
            })
            .collect()
    }

    pub fn fail_next_fetches(&self, n: usize) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    pub fn source(&self) -> FakeSource {
        FakeSource {
            broker: self.clone(),
        }
    }
}

pub struct FakeSource {
    broker: FakeBroker,
}

#[async_trait]
impl MessageSource for FakeSource {
    type Delivery = FakeDelivery;

    async fn fetch(
        &mut self,
        max: usize,
        wait: Duration,
        shutdown: &mut Shutdown,
    ) -> BusResult<Vec<FakeDelivery>> {
        if self
            .broker
            .fail_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BusError::Fetch("connection reset".to_string()));
        }

        let batch = self.broker.take(max);
        if batch.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {}
            }
        }
        Ok(batch)
    }
}

pub struct FakeDelivery {
    message: StoredMessage,
    broker: FakeBroker,
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_count(&self) -> u64 {
        self.message.delivered
    }

    async fn settle(&self, disposition: Disposition, nak_delay: Duration) -> BusResult<()> {
        let payload = String::from_utf8_lossy(&self.message.payload).into_owned();
        self.broker
            .settlements
            .lock()
            .unwrap()
            .push((payload, disposition));
        if disposition == Disposition::Nak {
            self.broker.nak_delays.lock().unwrap().push(nak_delay);
            self.broker
                .queue
                .lock()
                .unwrap()
                .push_back(self.message.clone());
        }
        Ok(())
    }
}

/// Records one row per event id, like an `ON CONFLICT DO NOTHING` insert.
#[derive(Default)]
pub struct RecordingHandler {
    pub rows: Mutex<HashMap<String, String>>,
    pub applies: AtomicUsize,
    pub failures_left: AtomicUsize,
    pub apply_delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            apply_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    type Event = InboundEvent;
    type Valid = (String, String);

    fn parse(&self, _subject: &str, payload: &[u8]) -> Result<InboundEvent, PoisonPill> {
        InboundEvent::parse(payload)
    }

    fn validate(&self, event: InboundEvent) -> Result<(String, String), PoisonPill> {
        let id = event
            .event_id()
            .ok_or_else(|| PoisonPill::new("missing event id"))?;
        require_uuid("event_id", &id)?;
        Ok((id, event.event_type().to_string()))
    }

    async fn apply(&self, (id, event_type): (String, String)) -> Result<(), TransientError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransientError::new("database unavailable"));
        }
        self.rows.lock().unwrap().entry(id).or_insert(event_type);
        Ok(())
    }
}

pub fn event_json(id: &str, event_type: &str) -> String {
    format!(
        r#"{{"id":"{}","aggregate_type":"order","aggregate_id":"42","actor_id":"","type":"{}","payload":{{"total":10}}}}"#,
        id, event_type
    )
}
