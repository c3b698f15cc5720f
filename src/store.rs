use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::types::{DedupKey, InventoryExpectation, ItemBillRecord, SyncLogEntry};

/// Shared state behind the dedup window, the expectation ledger, the
/// item-bill index, and the status-page log.
///
/// Methods are best-effort and infallible at the signature level: the
/// dedup window is advisory (handlers re-check ledger state), so a store
/// hiccup must degrade to "treat as new" rather than fail the request.
/// Backends serving more than one process instance must make
/// `dedup_admit` and `consume_expectation` atomic.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Record `key` if it has not been seen within `ttl`.
    /// Returns true when the key is new (the event should be processed).
    async fn dedup_admit(&self, key: &DedupKey, ttl: Duration) -> bool;

    /// Drop expired dedup entries and expectations. Backends with native
    /// per-key expiry may no-op.
    async fn compact(&self);

    async fn record_expectation(&self, expectation: InventoryExpectation);

    /// Find-and-remove in one step: at most one caller gets the match.
    /// Matching is exact on `(sku, location_id, quantity)`; expired
    /// entries never match.
    async fn consume_expectation(
        &self,
        sku: &str,
        location_id: i64,
        quantity: i64,
    ) -> Option<InventoryExpectation>;

    async fn save_item_bill(&self, record: &ItemBillRecord);
    async fn bills_for_item(&self, item_code: &str) -> Vec<ItemBillRecord>;
    async fn remove_item_bill(&self, invoice_id: &str);

    async fn push_sync_log(&self, entry: SyncLogEntry);
    async fn recent_sync_log(&self, limit: usize) -> Vec<SyncLogEntry>;
}

/// In-memory store for single-process deployments.
///
/// Expiry is passive (checked on lookup) with periodic compaction; the
/// dedup map is additionally capped so growth stays bounded between
/// sweeps. Expectations recorded here are invisible to other process
/// instances; multi-instance deployments need the Redis backend.
pub struct InMemoryStore {
    dedup: Mutex<HashMap<String, DedupEntry>>,
    expectations: Mutex<Vec<InventoryExpectation>>,
    bills: Mutex<Vec<ItemBillRecord>>,
    sync_log: Mutex<VecDeque<SyncLogEntry>>,
    dedup_capacity: usize,
    sync_log_capacity: usize,
}

struct DedupEntry {
    seen_at: Instant,
    ttl: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(10_000, 50)
    }

    pub fn with_capacity(dedup_capacity: usize, sync_log_capacity: usize) -> Self {
        Self {
            dedup: Mutex::new(HashMap::new()),
            expectations: Mutex::new(Vec::new()),
            bills: Mutex::new(Vec::new()),
            sync_log: Mutex::new(VecDeque::new()),
            dedup_capacity: dedup_capacity.max(1),
            sync_log_capacity: sync_log_capacity.max(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn dedup_admit(&self, key: &DedupKey, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut guard = self.dedup.lock().await;

        if let Some(entry) = guard.get(&key.0) {
            if now.duration_since(entry.seen_at) < entry.ttl {
                return false;
            }
        }

        guard.insert(key.0.clone(), DedupEntry { seen_at: now, ttl });

        if guard.len() > self.dedup_capacity {
            guard.retain(|_, entry| now.duration_since(entry.seen_at) < entry.ttl);
            while guard.len() > self.dedup_capacity {
                let oldest = guard
                    .iter()
                    .min_by_key(|(_, entry)| entry.seen_at)
                    .map(|(k, _)| k.clone());
                let Some(oldest) = oldest else { break };
                guard.remove(&oldest);
            }
        }

        true
    }

    async fn compact(&self) {
        let now = Instant::now();
        {
            let mut guard = self.dedup.lock().await;
            guard.retain(|_, entry| now.duration_since(entry.seen_at) < entry.ttl);
        }
        {
            let now_secs = now_secs();
            let mut guard = self.expectations.lock().await;
            guard.retain(|exp| exp.expires_at_secs > now_secs);
        }
    }

    async fn record_expectation(&self, expectation: InventoryExpectation) {
        self.expectations.lock().await.push(expectation);
    }

    async fn consume_expectation(
        &self,
        sku: &str,
        location_id: i64,
        quantity: i64,
    ) -> Option<InventoryExpectation> {
        let now = now_secs();
        let mut guard = self.expectations.lock().await;
        let index = guard.iter().position(|exp| {
            exp.sku == sku
                && exp.location_id == location_id
                && exp.expected_quantity == quantity
                && exp.expires_at_secs > now
        })?;
        Some(guard.swap_remove(index))
    }

    async fn save_item_bill(&self, record: &ItemBillRecord) {
        self.bills.lock().await.push(record.clone());
    }

    async fn bills_for_item(&self, item_code: &str) -> Vec<ItemBillRecord> {
        self.bills
            .lock()
            .await
            .iter()
            .filter(|record| record.item_code == item_code)
            .cloned()
            .collect()
    }

    async fn remove_item_bill(&self, invoice_id: &str) {
        let mut guard = self.bills.lock().await;
        guard.retain(|record| record.invoice_id != invoice_id);
    }

    async fn push_sync_log(&self, entry: SyncLogEntry) {
        let mut guard = self.sync_log.lock().await;
        guard.push_front(entry);
        while guard.len() > self.sync_log_capacity {
            guard.pop_back();
        }
    }

    async fn recent_sync_log(&self, limit: usize) -> Vec<SyncLogEntry> {
        self.sync_log.lock().await.iter().take(limit).cloned().collect()
    }
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expectation(sku: &str, location_id: i64, quantity: i64) -> InventoryExpectation {
        let now = now_secs();
        InventoryExpectation {
            sku: sku.to_string(),
            location_id,
            expected_quantity: quantity,
            reason: Some("restock push".to_string()),
            created_at_secs: now,
            expires_at_secs: now + 600,
        }
    }

    #[tokio::test]
    async fn dedup_admits_once_within_ttl() {
        let store = InMemoryStore::new();
        let key = DedupKey("abc".to_string());
        assert!(store.dedup_admit(&key, Duration::from_secs(600)).await);
        assert!(!store.dedup_admit(&key, Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn dedup_readmits_after_expiry() {
        let store = InMemoryStore::new();
        let key = DedupKey("abc".to_string());
        assert!(store.dedup_admit(&key, Duration::from_millis(10)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.dedup_admit(&key, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn dedup_stays_bounded() {
        let store = InMemoryStore::with_capacity(8, 50);
        for i in 0..100 {
            let key = DedupKey(format!("key-{i}"));
            store.dedup_admit(&key, Duration::from_secs(600)).await;
        }
        assert!(store.dedup.lock().await.len() <= 8);
    }

    #[tokio::test]
    async fn expectation_consumed_exactly_once() {
        let store = InMemoryStore::new();
        store.record_expectation(expectation("ABC", 1, 5)).await;

        let first = store.consume_expectation("ABC", 1, 5).await;
        assert!(first.is_some());
        assert_eq!(first.unwrap().reason.as_deref(), Some("restock push"));

        assert!(store.consume_expectation("ABC", 1, 5).await.is_none());
    }

    #[tokio::test]
    async fn expectation_requires_exact_quantity() {
        let store = InMemoryStore::new();
        store.record_expectation(expectation("ABC", 1, 5)).await;
        assert!(store.consume_expectation("ABC", 1, 6).await.is_none());
        assert!(store.consume_expectation("ABC", 2, 5).await.is_none());
        assert!(store.consume_expectation("ABC", 1, 5).await.is_some());
    }

    #[tokio::test]
    async fn expired_expectation_never_matches() {
        let store = InMemoryStore::new();
        let mut exp = expectation("ABC", 1, 5);
        exp.expires_at_secs = now_secs().saturating_sub(1);
        store.record_expectation(exp).await;
        assert!(store.consume_expectation("ABC", 1, 5).await.is_none());
    }

    #[tokio::test]
    async fn bill_index_tracks_by_item_and_invoice() {
        let store = InMemoryStore::new();
        let record = ItemBillRecord {
            item_code: "STX-ABC".to_string(),
            invoice_id: "inv-1".to_string(),
            quantity: 3.0,
            reference: Some("Inventory adjustment".to_string()),
            synced_at_secs: now_secs(),
        };
        store.save_item_bill(&record).await;

        assert_eq!(store.bills_for_item("STX-ABC").await.len(), 1);
        assert!(store.bills_for_item("STX-OTHER").await.is_empty());

        store.remove_item_bill("inv-1").await;
        assert!(store.bills_for_item("STX-ABC").await.is_empty());
    }

    #[tokio::test]
    async fn sync_log_is_bounded_and_newest_first() {
        let store = InMemoryStore::with_capacity(100, 3);
        for i in 0..5 {
            store
                .push_sync_log(SyncLogEntry {
                    inventory_item_id: i,
                    available: 1,
                    updated_at: format!("T{i}"),
                })
                .await;
        }
        let recent = store.recent_sync_log(10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].inventory_item_id, 4);
    }
}
