use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use event_bus::{
    ensure_stream, BusError, BusResult, CreateOutcome, EnsureOutcome, RetentionLimits,
    StreamAdmin, StreamSpec,
};

/// Broker stub. `race` makes the first create lose to a concurrent creator.
#[derive(Default)]
struct FakeAdmin {
    streams: Mutex<Vec<StreamSpec>>,
    creates: AtomicUsize,
    race: bool,
    unreachable: bool,
}

#[async_trait]
impl StreamAdmin for FakeAdmin {
    async fn stream_exists(&self, name: &str) -> BusResult<bool> {
        if self.unreachable {
            return Err(BusError::Provision {
                stream: name.to_string(),
                reason: "no responders".to_string(),
            });
        }
        Ok(self.streams.lock().unwrap().iter().any(|s| s.name == name))
    }

    async fn create_stream(&self, spec: &StreamSpec) -> BusResult<CreateOutcome> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut streams = self.streams.lock().unwrap();
        if self.race || streams.iter().any(|s| s.name == spec.name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        streams.push(spec.clone());
        Ok(CreateOutcome::Created)
    }
}

fn spec() -> StreamSpec {
    StreamSpec::new(
        "DOMAIN_EVENTS",
        vec!["DOMAIN_EVENTS.>".to_string(), "outbox.>".to_string()],
        RetentionLimits::default(),
    )
}

#[tokio::test]
async fn test_ensure_stream_creates_once() {
    let admin = FakeAdmin::default();

    assert_eq!(ensure_stream(&admin, &spec()).await.unwrap(), EnsureOutcome::Created);
    assert_eq!(ensure_stream(&admin, &spec()).await.unwrap(), EnsureOutcome::Existing);
    assert_eq!(ensure_stream(&admin, &spec()).await.unwrap(), EnsureOutcome::Existing);

    assert_eq!(admin.creates.load(Ordering::SeqCst), 1);
    assert_eq!(admin.streams.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_creation_is_not_an_error() {
    let admin = FakeAdmin {
        race: true,
        ..Default::default()
    };

    let outcome = ensure_stream(&admin, &spec()).await.unwrap();
    assert_eq!(outcome, EnsureOutcome::Existing);
}

#[tokio::test]
async fn test_parallel_callers_all_succeed() {
    let admin = Arc::new(FakeAdmin::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let admin = admin.clone();
            tokio::spawn(async move { ensure_stream(admin.as_ref(), &spec()).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == EnsureOutcome::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(admin.streams.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_broker_is_fatal() {
    let admin = FakeAdmin {
        unreachable: true,
        ..Default::default()
    };

    let err = ensure_stream(&admin, &spec()).await.unwrap_err();
    assert!(matches!(err, BusError::Provision { .. }));
    assert_eq!(admin.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_subject_list_is_rejected() {
    let admin = FakeAdmin::default();
    let spec = StreamSpec::new("DOMAIN_EVENTS", vec![], RetentionLimits::default());

    assert!(ensure_stream(&admin, &spec).await.is_err());
    assert_eq!(admin.creates.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stream_covers_routed_and_legacy_subjects() {
    let spec = spec();
    assert!(spec.covers("DOMAIN_EVENTS.orders.order.created"));
    assert!(spec.covers("outbox.orders"));
    assert!(!spec.covers("orders.created"));
    assert!(matches!(
        spec.check_covers("orders.created"),
        Err(BusError::SubjectNotCovered { .. })
    ));
}
