#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use redis::AsyncCommands;
#[cfg(feature = "redis")]
use std::time::Duration;

#[cfg(feature = "redis")]
use crate::store::{now_secs, SyncStore};
#[cfg(feature = "redis")]
use crate::types::{DedupKey, InventoryExpectation, ItemBillRecord, SyncLogEntry};

/// Redis-backed store for deployments with more than one process
/// instance.
///
/// Dedup keys and expectations use native per-key expiry, so `compact`
/// is a no-op. `dedup_admit` is a single `SET NX EX` and
/// `consume_expectation` a single `GETDEL`, which keeps both atomic
/// across instances. Connection failures degrade open: the event is
/// treated as new and the handlers' ledger-side idempotency checks
/// carry the guarantee.
#[cfg(feature = "redis")]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    sync_log_capacity: usize,
}

#[cfg(feature = "redis")]
impl RedisStore {
    pub fn new(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            sync_log_capacity: 50,
        }
    }

    pub fn with_sync_log_capacity(mut self, capacity: usize) -> Self {
        self.sync_log_capacity = capacity.max(1);
        self
    }

    fn dedup_key(&self, key: &DedupKey) -> String {
        format!("{}:dedup:{}", self.prefix, key.0)
    }

    fn expectation_key(&self, sku: &str, location_id: i64, quantity: i64) -> String {
        format!("{}:exp:{}:{}:{}", self.prefix, sku, location_id, quantity)
    }

    fn bills_key(&self) -> String {
        format!("{}:bills", self.prefix)
    }

    fn sync_log_key(&self) -> String {
        format!("{}:synclog", self.prefix)
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl SyncStore for RedisStore {
    async fn dedup_admit(&self, key: &DedupKey, ttl: Duration) -> bool {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return true,
        };

        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(self.dedup_key(key))
            .arg(now_secs())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(_) => true,
        }
    }

    async fn compact(&self) {
        // Native key expiry; nothing to sweep.
    }

    async fn record_expectation(&self, expectation: InventoryExpectation) {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return,
        };
        let ttl = expectation.expires_at_secs.saturating_sub(now_secs()).max(1);
        let key = self.expectation_key(
            &expectation.sku,
            expectation.location_id,
            expectation.expected_quantity,
        );
        let payload = serde_json::to_string(&expectation).unwrap_or_default();
        let _: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await;
    }

    async fn consume_expectation(
        &self,
        sku: &str,
        location_id: i64,
        quantity: i64,
    ) -> Option<InventoryExpectation> {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return None,
        };
        let result: redis::RedisResult<Option<String>> = redis::cmd("GETDEL")
            .arg(self.expectation_key(sku, location_id, quantity))
            .query_async(&mut conn)
            .await;
        let payload = result.ok().flatten()?;
        serde_json::from_str::<InventoryExpectation>(&payload).ok()
    }

    async fn save_item_bill(&self, record: &ItemBillRecord) {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return,
        };
        let payload = serde_json::to_string(record).unwrap_or_default();
        let _: redis::RedisResult<()> = conn
            .hset(self.bills_key(), record.invoice_id.clone(), payload)
            .await;
    }

    async fn bills_for_item(&self, item_code: &str) -> Vec<ItemBillRecord> {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.bills_key()).await.unwrap_or_default();
        map.into_values()
            .filter_map(|payload| serde_json::from_str::<ItemBillRecord>(&payload).ok())
            .filter(|record| record.item_code == item_code)
            .collect()
    }

    async fn remove_item_bill(&self, invoice_id: &str) {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return,
        };
        let _: redis::RedisResult<()> = conn.hdel(self.bills_key(), invoice_id).await;
    }

    async fn push_sync_log(&self, entry: SyncLogEntry) {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return,
        };
        let payload = serde_json::to_string(&entry).unwrap_or_default();
        let _: redis::RedisResult<()> = conn.lpush(self.sync_log_key(), payload).await;
        let _: redis::RedisResult<()> = conn
            .ltrim(self.sync_log_key(), 0, self.sync_log_capacity as isize - 1)
            .await;
    }

    async fn recent_sync_log(&self, limit: usize) -> Vec<SyncLogEntry> {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let values: Vec<String> = conn
            .lrange(self.sync_log_key(), 0, limit as isize - 1)
            .await
            .unwrap_or_default();
        values
            .into_iter()
            .filter_map(|payload| serde_json::from_str::<SyncLogEntry>(&payload).ok())
            .collect()
    }
}
