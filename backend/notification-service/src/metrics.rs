use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

use crate::models::DeliveryStatus;

static WEBHOOK_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_webhook_deliveries_total",
            "Webhook delivery attempts by outcome",
        ),
        &["status"],
    )
    .expect("failed to create notification_service_webhook_deliveries_total");
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        tracing::warn!("Failed to register webhook deliveries counter: {}", e);
    }
    counter
});

static WEBHOOK_DELIVERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_service_webhook_delivery_duration_seconds",
            "Time spent on one webhook POST, including the timeout path",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["status"],
    )
    .expect("failed to create notification_service_webhook_delivery_duration_seconds");
    if let Err(e) = prometheus::default_registry().register(Box::new(histogram.clone())) {
        tracing::warn!("Failed to register webhook delivery histogram: {}", e);
    }
    histogram
});

static DELIVERY_LOG_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_delivery_log_failures_total",
            "Delivery log rows that could not be written",
        ),
        &["status"],
    )
    .expect("failed to create notification_service_delivery_log_failures_total");
    if let Err(e) = prometheus::default_registry().register(Box::new(counter.clone())) {
        tracing::warn!("Failed to register delivery log failure counter: {}", e);
    }
    counter
});

pub fn observe_webhook_delivery(status: DeliveryStatus, elapsed: Duration) {
    WEBHOOK_DELIVERIES_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
    WEBHOOK_DELIVERY_DURATION_SECONDS
        .with_label_values(&[status.as_str()])
        .observe(elapsed.as_secs_f64());
}

pub fn observe_delivery_log_failure(status: DeliveryStatus) {
    DELIVERY_LOG_FAILURES_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
}
