use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use tracing::warn;

use crate::disposition::Disposition;

#[derive(Clone)]
pub struct ConsumerMetrics {
    pub messages: IntCounterVec,
    pub fetch_errors: IntCounterVec,
    pub process_duration_seconds: HistogramVec,
}

impl ConsumerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let messages = IntCounterVec::new(
            Opts::new(
                "event_bus_messages_total",
                "Messages processed by durable consumers, by disposition",
            )
            .const_label("service", service.to_string()),
            &["durable", "disposition"],
        )
        .expect("valid metric opts for event_bus_messages_total");

        let fetch_errors = IntCounterVec::new(
            Opts::new(
                "event_bus_fetch_errors_total",
                "Failed batch fetches from the broker",
            )
            .const_label("service", service.to_string()),
            &["durable"],
        )
        .expect("valid metric opts for event_bus_fetch_errors_total");

        let process_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "event_bus_process_duration_seconds",
                "Time spent processing one message",
            )
            .const_label("service", service.to_string())
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["durable"],
        )
        .expect("valid metric opts for event_bus_process_duration_seconds");

        for metric in [
            Box::new(messages.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(fetch_errors.clone()),
            Box::new(process_duration_seconds.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register event bus metric: {}", e);
            }
        }

        Self {
            messages,
            fetch_errors,
            process_duration_seconds,
        }
    }

    pub fn record(&self, durable: &str, disposition: Disposition, elapsed_secs: f64) {
        self.messages
            .with_label_values(&[durable, disposition.as_str()])
            .inc();
        self.process_duration_seconds
            .with_label_values(&[durable])
            .observe(elapsed_secs);
    }
}
