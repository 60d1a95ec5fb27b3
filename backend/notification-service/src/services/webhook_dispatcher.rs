//! Fan-out of one event to every subscribed webhook.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde_json::value::RawValue;
use tracing::{debug, error, info, warn};

use crate::error::DispatchResult;
use crate::metrics;
use crate::models::{
    DeliveryLogEntry, DeliveryStatus, EndpointOutcome, WebhookEnvelope, WebhookRegistration,
};
use crate::repository::{DeliveryLog, WebhookDirectory};
use crate::services::signature::{sign, SIGNATURE_HEADER};

pub struct WebhookDispatcher {
    client: Client,
    directory: Arc<dyn WebhookDirectory>,
    log: Arc<dyn DeliveryLog>,
}

impl WebhookDispatcher {
    pub fn new(
        directory: Arc<dyn WebhookDirectory>,
        log: Arc<dyn DeliveryLog>,
        timeout: Duration,
    ) -> DispatchResult<Self> {
        // A followed redirect turns the signed POST into a bodiless GET.
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            directory,
            log,
        })
    }

    /// Deliver `payload` to every active webhook subscribed to `event_type`.
    ///
    /// Every endpoint is attempted regardless of the others and produces one
    /// delivery log entry. The envelope is serialized once, so every endpoint
    /// receives (and has signed) identical bytes. A directory lookup failure
    /// is returned as an error; endpoint failures are reported in the outcomes.
    pub async fn dispatch(
        &self,
        event_type: &str,
        payload: &RawValue,
    ) -> DispatchResult<Vec<EndpointOutcome>> {
        let hooks = self.directory.active_for_event(event_type).await?;
        if hooks.is_empty() {
            debug!(event_type, "No webhooks subscribed");
            return Ok(Vec::new());
        }

        let body = serde_json::to_vec(&WebhookEnvelope::new(event_type, payload))?;

        let mut outcomes = Vec::with_capacity(hooks.len());
        for hook in &hooks {
            let outcome = self.deliver(hook, &body).await;
            self.record(hook, &outcome).await;
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        info!(
            event_type,
            endpoints = outcomes.len(),
            failed,
            "Webhook fan-out finished"
        );
        Ok(outcomes)
    }

    async fn deliver(&self, hook: &WebhookRegistration, body: &[u8]) -> EndpointOutcome {
        let started = Instant::now();
        let signature = sign(&hook.secret, body);

        let result = self
            .client
            .post(&hook.endpoint_url)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await;

        let (status, http_status, error) = match result {
            Ok(response) if response.status().is_success() => {
                (DeliveryStatus::Success, Some(response.status().as_u16()), None)
            }
            Ok(response) => {
                let code = response.status();
                (
                    DeliveryStatus::Failed,
                    Some(code.as_u16()),
                    Some(format!("unexpected status {}", code)),
                )
            }
            Err(e) => (DeliveryStatus::Failed, None, Some(e.to_string())),
        };

        metrics::observe_webhook_delivery(status, started.elapsed());

        if let Some(reason) = &error {
            warn!(
                webhook_id = %hook.id,
                endpoint = %hook.endpoint_url,
                error = %reason,
                "Webhook delivery failed"
            );
        }

        EndpointOutcome {
            webhook_id: hook.id,
            endpoint_url: hook.endpoint_url.clone(),
            status,
            http_status,
            error,
        }
    }

    async fn record(&self, hook: &WebhookRegistration, outcome: &EndpointOutcome) {
        let entry = DeliveryLogEntry::webhook(hook, outcome);
        if let Err(e) = self.log.append(&entry).await {
            metrics::observe_delivery_log_failure(outcome.status);
            error!(
                webhook_id = %hook.id,
                status = outcome.status.as_str(),
                "Failed to write delivery log: {}",
                e
            );
        }
    }
}
