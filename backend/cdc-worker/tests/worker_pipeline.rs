//! Slot-to-bus forwarding against an in-memory slot and publisher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use cdc_replication::pgoutput::encode;
use cdc_replication::{Lsn, TupleColumn};
use cdc_worker::{CdcWorker, SubjectMode, SubjectRouter, WalChange, WalSource};
use event_bus::{BusError, BusResult, EventPublisher, ShutdownController};

const OUTBOX: u32 = 16384;
const COLUMNS: [&str; 6] = ["id", "aggregate_type", "aggregate_id", "actor_id", "type", "payload"];

/// Slot that hands out everything past its confirmed position.
#[derive(Default)]
struct FakeSlot {
    wal: Vec<WalChange>,
    confirmed: Lsn,
    advances: Vec<Lsn>,
}

impl FakeSlot {
    fn push(&mut self, lsn: u64, data: Vec<u8>) {
        self.wal.push(WalChange {
            lsn: Lsn(lsn),
            data: Bytes::from(data),
        });
        self.wal.sort_by_key(|c| c.lsn);
    }

    fn relation(&mut self, lsn: u64) {
        self.push(lsn, encode::relation(OUTBOX, "public", "outbox_events", &COLUMNS));
    }

    /// One transaction with one outbox insert, committed at `lsn + 20`.
    fn transaction(&mut self, lsn: u64, values: [&str; 6]) {
        let tuple: Vec<TupleColumn> = values.iter().map(|v| TupleColumn::text(*v)).collect();
        self.push(lsn, encode::begin(lsn + 20, 700));
        self.push(lsn + 10, encode::insert(OUTBOX, &tuple));
        self.push(lsn + 20, encode::commit(lsn + 20, lsn + 30));
    }
}

struct SharedSlot(Arc<Mutex<FakeSlot>>);

#[async_trait]
impl WalSource for SharedSlot {
    async fn peek(&mut self, max_changes: i32) -> Result<Vec<WalChange>> {
        let slot = self.0.lock().unwrap();
        Ok(slot
            .wal
            .iter()
            .filter(|c| c.lsn > slot.confirmed)
            .take(max_changes as usize)
            .cloned()
            .collect())
    }

    async fn advance(&mut self, to: Lsn) -> Result<()> {
        let mut slot = self.0.lock().unwrap();
        slot.confirmed = to;
        slot.advances.push(to);
        Ok(())
    }
}

#[derive(Default)]
struct FakePublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail_next: AtomicUsize,
    fail_subject: Mutex<Option<String>>,
}

impl FakePublisher {
    fn subjects(&self) -> Vec<String> {
        self.published.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for FakePublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> BusResult<()> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BusError::Publish("no responders".to_string()));
        }
        if self.fail_subject.lock().unwrap().as_deref() == Some(subject) {
            return Err(BusError::Publish("timed out".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload.to_vec()));
        Ok(())
    }
}

fn setup() -> (
    Arc<Mutex<FakeSlot>>,
    Arc<FakePublisher>,
    CdcWorker<SharedSlot, FakePublisher>,
) {
    let slot = Arc::new(Mutex::new(FakeSlot::default()));
    let publisher = Arc::new(FakePublisher::default());
    let worker = CdcWorker::new(
        SharedSlot(slot.clone()),
        publisher.clone(),
        SubjectRouter::new("orders", SubjectMode::Routed),
    );
    (slot, publisher, worker)
}

#[tokio::test]
async fn test_insert_is_published_and_slot_advanced() {
    let (slot, publisher, mut worker) = setup();
    {
        let mut slot = slot.lock().unwrap();
        slot.relation(100);
        slot.transaction(110, ["e1", "order", "o1", "u1", "order_created", r#"{"total":10}"#]);
    }

    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(140)));
    assert!(!outcome.stalled);

    let published = publisher.published.lock().unwrap().clone();
    assert_eq!(published[0].0, "DOMAIN_EVENTS.orders.order.order_created");
    let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "id": "e1",
            "aggregate_type": "order",
            "aggregate_id": "o1",
            "actor_id": "u1",
            "type": "order_created",
            "payload": {"total": 10}
        })
    );

    // Nothing new after the advance.
    let outcome = worker.poll_once().await.unwrap();
    assert!(outcome.is_idle());
    assert_eq!(publisher.subjects().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_keeps_slot_position() {
    let (slot, publisher, mut worker) = setup();
    {
        let mut slot = slot.lock().unwrap();
        slot.relation(100);
        slot.transaction(110, ["e1", "order", "o1", "u1", "order_created", "{}"]);
    }
    publisher.fail_next.store(1, Ordering::SeqCst);

    let outcome = worker.poll_once().await.unwrap();
    assert!(outcome.stalled);
    assert_eq!(outcome.advanced_to, None);
    assert!(slot.lock().unwrap().advances.is_empty());

    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(140)));
}

#[tokio::test]
async fn test_slot_advances_only_past_fully_published_transactions() {
    let (slot, publisher, mut worker) = setup();
    {
        let mut slot = slot.lock().unwrap();
        slot.relation(100);
        slot.transaction(110, ["e1", "order", "o1", "u1", "order_created", "{}"]);
        slot.transaction(210, ["e2", "order", "o1", "u1", "order_paid", "{}"]);
    }
    *publisher.fail_subject.lock().unwrap() =
        Some("DOMAIN_EVENTS.orders.order.order_paid".to_string());

    let outcome = worker.poll_once().await.unwrap();
    assert!(outcome.stalled);
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(140)));

    // The failed transaction is read again once the broker recovers.
    *publisher.fail_subject.lock().unwrap() = None;
    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(240)));
    assert_eq!(
        publisher.subjects(),
        vec![
            "DOMAIN_EVENTS.orders.order.order_created",
            "DOMAIN_EVENTS.orders.order.order_paid"
        ]
    );
}

#[tokio::test]
async fn test_unknown_relation_resyncs_without_advancing() {
    let (slot, publisher, mut worker) = setup();
    slot.lock()
        .unwrap()
        .transaction(110, ["e1", "order", "o1", "u1", "order_created", "{}"]);

    let outcome = worker.poll_once().await.unwrap();
    assert!(outcome.stalled);
    assert_eq!(outcome.published, 0);
    assert!(slot.lock().unwrap().advances.is_empty());
    assert!(worker.decoder().relations().is_empty());

    // The relation message is visible on the next read from the slot position.
    slot.lock().unwrap().relation(105);
    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(140)));
    assert_eq!(publisher.subjects().len(), 1);
}

#[tokio::test]
async fn test_invalid_payload_is_skipped_not_blocking() {
    let (slot, publisher, mut worker) = setup();
    {
        let mut slot = slot.lock().unwrap();
        slot.relation(100);
        slot.transaction(110, ["e1", "order", "o1", "u1", "order_created", "not json"]);
        slot.transaction(210, ["e2", "order", "o1", "u1", "order_paid", "{}"]);
    }

    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.advanced_to, Some(Lsn(240)));
    assert_eq!(publisher.subjects(), vec!["DOMAIN_EVENTS.orders.order.order_paid"]);
}

#[tokio::test]
async fn test_legacy_subject_mode() {
    let slot = Arc::new(Mutex::new(FakeSlot::default()));
    let publisher = Arc::new(FakePublisher::default());
    let mut worker = CdcWorker::new(
        SharedSlot(slot.clone()),
        publisher.clone(),
        SubjectRouter::new("abc", SubjectMode::Legacy),
    );
    {
        let mut slot = slot.lock().unwrap();
        slot.relation(100);
        slot.transaction(110, ["e1", "item", "i1", "u1", "ItemCreated", "{}"]);
    }

    worker.poll_once().await.unwrap();
    assert_eq!(publisher.subjects(), vec!["outbox.abc"]);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let (_slot, _publisher, worker) = setup();
    let shutdown = ShutdownController::new();
    let handle = tokio::spawn(worker.run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
