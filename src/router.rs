use std::sync::Arc;

use crate::config::SyncConfig;
use crate::dedup::DedupWindow;
use crate::error::{HandlerOutcome, SyncError};
use crate::handlers::SyncHandlers;
use crate::signing::verify_webhook_request;
use crate::store::SyncStore;
use crate::types::{
    InventoryLevelPayload, OrderPayload, RefundPayload, SyncLogEntry, Topic,
};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// One inbound webhook delivery, exactly as received.
///
/// The raw body bytes are kept unparsed until the signature over them
/// has been verified.
pub struct InboundEvent<'a> {
    pub topic: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// What the HTTP surface should answer.
#[derive(Debug)]
pub enum RouterResponse {
    /// Signature failure: reject before parsing. 401.
    Unauthorized,
    /// Delivery received and classified. 200 whether the handler
    /// synced, skipped, or suppressed a duplicate.
    Accepted(HandlerOutcome),
    /// Unexpected processing failure. 500.
    Failed(String),
}

/// Sequences verification → dedup → dispatch for every delivery.
pub struct EventRouter {
    secret: Vec<u8>,
    window: DedupWindow,
    handlers: SyncHandlers,
    store: Arc<dyn SyncStore>,
}

impl EventRouter {
    pub fn new(config: &SyncConfig, store: Arc<dyn SyncStore>, handlers: SyncHandlers) -> Self {
        Self {
            secret: config.shopify_api_secret.as_bytes().to_vec(),
            window: DedupWindow::new(store.clone(), config.dedup_ttl),
            handlers,
            store,
        }
    }

    pub async fn handle(&self, event: InboundEvent<'_>) -> RouterResponse {
        if let Err(err) = verify_webhook_request(event.signature, event.body, &self.secret) {
            tracing::warn!(topic = event.topic.unwrap_or(""), ?err, "rejected webhook");
            metric_inc("webhook.receive.rejected");
            return RouterResponse::Unauthorized;
        }

        let Some(raw_topic) = event.topic else {
            tracing::warn!("webhook without topic header");
            return RouterResponse::Accepted(HandlerOutcome::Received);
        };
        let topic = Topic::parse(raw_topic);

        let payload: serde_json::Value = match serde_json::from_slice(event.body) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(topic = raw_topic, %err, "malformed webhook payload");
                metric_inc("webhook.receive.failed");
                return RouterResponse::Failed(format!("malformed payload: {err}"));
            }
        };

        if !self.window.admit(&topic, &payload).await {
            tracing::info!(topic = raw_topic, "duplicate delivery suppressed");
            metric_inc("webhook.receive.duplicate");
            return RouterResponse::Accepted(HandlerOutcome::Duplicate);
        }

        if topic == Topic::InventoryLevelsUpdate {
            self.log_inventory_event(&payload).await;
        }

        let result = self.dispatch(&topic, payload).await;
        match result {
            Ok(outcome) => {
                tracing::info!(topic = raw_topic, outcome = outcome.as_str(), "handled webhook");
                metric_inc("webhook.receive.accepted");
                RouterResponse::Accepted(outcome)
            }
            Err(err) if err.is_resolution() => {
                // Retrying will not change the outcome; acknowledge.
                tracing::warn!(topic = raw_topic, %err, "resolution failed, acknowledging");
                RouterResponse::Accepted(HandlerOutcome::skipped(err.to_string()))
            }
            Err(err) => {
                tracing::error!(topic = raw_topic, %err, "webhook handling failed");
                metric_inc("webhook.receive.failed");
                RouterResponse::Failed(err.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        topic: &Topic,
        payload: serde_json::Value,
    ) -> Result<HandlerOutcome, SyncError> {
        match topic {
            Topic::InventoryLevelsUpdate => {
                let payload: InventoryLevelPayload = parse_payload(payload)?;
                self.handlers.handle_inventory_update(payload).await
            }
            Topic::OrdersPaid => {
                let order: OrderPayload = parse_payload(payload)?;
                self.handlers.handle_order_paid(order).await
            }
            Topic::OrdersCancelled => {
                let order: OrderPayload = parse_payload(payload)?;
                self.handlers.handle_order_cancelled(order).await
            }
            Topic::RefundsCreate => {
                let refund: RefundPayload = parse_payload(payload)?;
                self.handlers.handle_refund(refund).await
            }
            Topic::Other(raw) => {
                tracing::info!(topic = raw.as_str(), "unhandled topic, acknowledged");
                Ok(HandlerOutcome::Received)
            }
        }
    }

    async fn log_inventory_event(&self, payload: &serde_json::Value) {
        let entry = SyncLogEntry {
            inventory_item_id: payload
                .get("inventory_item_id")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default(),
            available: payload
                .get("available")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default(),
            updated_at: payload
                .get("updated_at")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        self.store.push_sync_log(entry).await;
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, SyncError> {
    serde_json::from_value(payload).map_err(|err| SyncError::Downstream {
        status: 400,
        body: format!("payload did not match topic schema: {err}"),
    })
}
