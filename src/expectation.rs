use std::sync::Arc;
use std::time::Duration;

use crate::store::{now_secs, SyncStore};
use crate::types::InventoryExpectation;

/// Ledger of inventory changes this system caused itself.
///
/// The write path records an expectation before pushing an inventory
/// change outward; when the commerce platform echoes that change back as
/// a webhook, the handler consumes the expectation instead of
/// re-syncing, which would otherwise loop. Matching is exact on
/// quantity and single-use; unmatched entries expire after the TTL.
pub struct ExpectationLedger {
    store: Arc<dyn SyncStore>,
    ttl: Duration,
}

impl ExpectationLedger {
    pub fn new(store: Arc<dyn SyncStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Register an expected quantity for `(sku, location_id)`.
    ///
    /// Concurrent expectations for the same pair may coexist; they are
    /// distinguished only by quantity.
    pub async fn record(
        &self,
        sku: &str,
        location_id: i64,
        expected_quantity: i64,
        reason: Option<String>,
    ) -> InventoryExpectation {
        let now = now_secs();
        let expectation = InventoryExpectation {
            sku: sku.to_string(),
            location_id,
            expected_quantity,
            reason,
            created_at_secs: now,
            expires_at_secs: now + self.ttl.as_secs(),
        };
        self.store.record_expectation(expectation.clone()).await;
        expectation
    }

    /// Match an observed quantity against a live expectation, consuming
    /// it on success. At most one expectation is consumed per call.
    pub async fn check_and_consume(
        &self,
        sku: &str,
        location_id: i64,
        observed_quantity: i64,
    ) -> Option<InventoryExpectation> {
        self.store
            .consume_expectation(sku, location_id, observed_quantity)
            .await
    }
}
