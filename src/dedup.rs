use std::sync::Arc;
use std::time::Duration;

use crate::store::SyncStore;
use crate::types::{DedupKey, Topic};

/// Short-lived window suppressing redelivery of the same logical event.
///
/// This is an optimization, not the source of truth: the upstream
/// platform redelivers on timeout and may deliver out of order, and a
/// false negative here (duplicate treated as new) is caught by each
/// handler's own ledger-side idempotency check. It therefore never
/// blocks an event on store failure.
pub struct DedupWindow {
    store: Arc<dyn SyncStore>,
    ttl: Duration,
}

impl DedupWindow {
    pub fn new(store: Arc<dyn SyncStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns true when this is the first delivery of the logical event
    /// within the TTL window.
    pub async fn admit(&self, topic: &Topic, payload: &serde_json::Value) -> bool {
        let key = DedupKey::derive(topic, payload);
        self.store.dedup_admit(&key, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn window(ttl: Duration) -> DedupWindow {
        DedupWindow::new(Arc::new(InMemoryStore::new()), ttl)
    }

    #[tokio::test]
    async fn second_delivery_within_ttl_is_duplicate() {
        let window = window(Duration::from_secs(600));
        let payload = serde_json::json!({"inventory_item_id": 123, "updated_at": "T1"});

        assert!(window.admit(&Topic::InventoryLevelsUpdate, &payload).await);
        assert!(!window.admit(&Topic::InventoryLevelsUpdate, &payload).await);
    }

    #[tokio::test]
    async fn delivery_after_ttl_is_independent() {
        let window = window(Duration::from_millis(20));
        let payload = serde_json::json!({"inventory_item_id": 123, "updated_at": "T1"});

        assert!(window.admit(&Topic::InventoryLevelsUpdate, &payload).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(window.admit(&Topic::InventoryLevelsUpdate, &payload).await);
    }

    #[tokio::test]
    async fn different_updates_are_distinct_events() {
        let window = window(Duration::from_secs(600));
        let first = serde_json::json!({"inventory_item_id": 123, "updated_at": "T1"});
        let second = serde_json::json!({"inventory_item_id": 123, "updated_at": "T2"});

        assert!(window.admit(&Topic::InventoryLevelsUpdate, &first).await);
        assert!(window.admit(&Topic::InventoryLevelsUpdate, &second).await);
    }

    #[tokio::test]
    async fn same_order_across_order_topics_stays_distinct() {
        let window = window(Duration::from_secs(600));
        let order = serde_json::json!({"id": 450789, "created_at": "T1"});

        assert!(window.admit(&Topic::OrdersPaid, &order).await);
        assert!(window.admit(&Topic::OrdersCancelled, &order).await);
        assert!(!window.admit(&Topic::OrdersPaid, &order).await);
    }
}
