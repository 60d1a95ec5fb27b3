use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct CdcMetrics {
    pub published: IntCounter,
    pub skipped: IntCounter,
    pub resyncs: IntCounter,
    pub publish_failures: IntCounter,
    pub confirmed_lsn: IntGauge,
}

impl CdcMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let published = IntCounter::with_opts(
            Opts::new("cdc_events_published_total", "Outbox rows published to the bus")
                .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cdc_events_published_total");

        let skipped = IntCounter::with_opts(
            Opts::new(
                "cdc_events_skipped_total",
                "Outbox rows dropped because they could not be serialized",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cdc_events_skipped_total");

        let resyncs = IntCounter::with_opts(
            Opts::new(
                "cdc_decoder_resyncs_total",
                "Decoder resets after an insert for an unknown relation",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cdc_decoder_resyncs_total");

        let publish_failures = IntCounter::with_opts(
            Opts::new(
                "cdc_publish_failures_total",
                "Publishes that failed and left the slot unadvanced",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cdc_publish_failures_total");

        let confirmed_lsn = IntGauge::with_opts(
            Opts::new(
                "cdc_confirmed_lsn",
                "Last WAL position the slot was advanced to",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cdc_confirmed_lsn");

        for collector in [
            Box::new(published.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(skipped.clone()),
            Box::new(resyncs.clone()),
            Box::new(publish_failures.clone()),
            Box::new(confirmed_lsn.clone()),
        ] {
            if let Err(e) = registry.register(collector) {
                warn!("cdc metric registration failed: {}", e);
            }
        }

        Self {
            published,
            skipped,
            resyncs,
            publish_failures,
            confirmed_lsn,
        }
    }
}
