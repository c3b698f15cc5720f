use std::time::Duration;

/// Process configuration.
///
/// Every process-wide constant lives here and is passed into components
/// at construction, so tests can run with different account codes and
/// TTLs without touching global state.
///
/// All fields can be overridden through environment variables:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | HTTP_PORT | 3000 | inbound webhook port |
/// | SHOPIFY_STORE_DOMAIN | (required) | `my-store.myshopify.com` |
/// | SHOPIFY_ACCESS_TOKEN | (required) | admin API token |
/// | SHOPIFY_API_SECRET | (required) | webhook HMAC secret |
/// | SHOPIFY_APP_SERVER | (required) | public base URL for webhook registration |
/// | XERO_CLIENT_ID / _SECRET / _REDIRECT_URI | (required) | OAuth app |
/// | SKU_PREFIX | STX | ledger item code prefix |
/// | INVENTORY_ASSET_ACCOUNT | 1400 | tracked-inventory asset account |
/// | COGS_ACCOUNT | 5000 | cost-of-goods-sold account |
/// | SALES_ACCOUNT | 4000 | sales revenue account |
/// | PAYMENT_ACCOUNT | 090 | bank account payments post to |
/// | DEDUP_TTL_SECS | 600 | dedup window |
/// | EXPECTATION_TTL_SECS | 600 | expectation lifetime |
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub http_port: u16,

    pub shopify_store_domain: String,
    pub shopify_access_token: String,
    pub shopify_api_secret: String,
    pub shopify_app_server: String,

    pub xero_client_id: String,
    pub xero_client_secret: String,
    pub xero_redirect_uri: String,

    /// Prefix for deterministic ledger item codes: `{prefix}-{sku}`.
    pub sku_prefix: String,
    pub inventory_asset_account: String,
    pub cogs_account: String,
    pub sales_account: String,
    pub payment_account: String,

    pub dedup_ttl: Duration,
    pub expectation_ttl: Duration,
    /// How often expired dedup/expectation entries are swept.
    pub compaction_interval: Duration,
    /// Hard cap on in-memory dedup entries between sweeps.
    pub dedup_capacity: usize,

    pub payment_sweep_interval: Duration,
    pub payment_sweep_max_attempts: u32,
    pub payment_sweep_jitter_ms: u64,

    pub sync_log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            shopify_store_domain: String::new(),
            shopify_access_token: String::new(),
            shopify_api_secret: String::new(),
            shopify_app_server: String::new(),
            xero_client_id: String::new(),
            xero_client_secret: String::new(),
            xero_redirect_uri: String::new(),
            sku_prefix: "STX".to_string(),
            inventory_asset_account: "1400".to_string(),
            cogs_account: "5000".to_string(),
            sales_account: "4000".to_string(),
            payment_account: "090".to_string(),
            dedup_ttl: Duration::from_secs(600),
            expectation_ttl: Duration::from_secs(600),
            compaction_interval: Duration::from_secs(60),
            dedup_capacity: 10_000,
            payment_sweep_interval: Duration::from_secs(300),
            payment_sweep_max_attempts: 5,
            payment_sweep_jitter_ms: 2_000,
            sync_log_capacity: 50,
        }
    }
}

impl SyncConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_port: env_parse("HTTP_PORT", defaults.http_port),
            shopify_store_domain: env_or("SHOPIFY_STORE_DOMAIN", ""),
            shopify_access_token: env_or("SHOPIFY_ACCESS_TOKEN", ""),
            shopify_api_secret: env_or("SHOPIFY_API_SECRET", ""),
            shopify_app_server: env_or("SHOPIFY_APP_SERVER", ""),
            xero_client_id: env_or("XERO_CLIENT_ID", ""),
            xero_client_secret: env_or("XERO_CLIENT_SECRET", ""),
            xero_redirect_uri: env_or("XERO_REDIRECT_URI", ""),
            sku_prefix: env_or("SKU_PREFIX", &defaults.sku_prefix),
            inventory_asset_account: env_or(
                "INVENTORY_ASSET_ACCOUNT",
                &defaults.inventory_asset_account,
            ),
            cogs_account: env_or("COGS_ACCOUNT", &defaults.cogs_account),
            sales_account: env_or("SALES_ACCOUNT", &defaults.sales_account),
            payment_account: env_or("PAYMENT_ACCOUNT", &defaults.payment_account),
            dedup_ttl: Duration::from_secs(env_parse("DEDUP_TTL_SECS", 600)),
            expectation_ttl: Duration::from_secs(env_parse("EXPECTATION_TTL_SECS", 600)),
            compaction_interval: Duration::from_secs(env_parse("COMPACTION_INTERVAL_SECS", 60)),
            dedup_capacity: env_parse("DEDUP_CAPACITY", defaults.dedup_capacity),
            payment_sweep_interval: Duration::from_secs(env_parse(
                "PAYMENT_SWEEP_INTERVAL_SECS",
                300,
            )),
            payment_sweep_max_attempts: env_parse(
                "PAYMENT_SWEEP_MAX_ATTEMPTS",
                defaults.payment_sweep_max_attempts,
            ),
            payment_sweep_jitter_ms: env_parse(
                "PAYMENT_SWEEP_JITTER_MS",
                defaults.payment_sweep_jitter_ms,
            ),
            sync_log_capacity: env_parse("SYNC_LOG_CAPACITY", defaults.sync_log_capacity),
        }
    }

    /// Deterministic ledger item code for a commerce SKU.
    pub fn item_code(&self, sku: &str) -> String {
        format!("{}-{}", self.sku_prefix, sku)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_code_uses_prefix() {
        let config = SyncConfig::default();
        assert_eq!(config.item_code("ABC-1"), "STX-ABC-1");

        let config = SyncConfig {
            sku_prefix: "WH".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(config.item_code("ABC-1"), "WH-ABC-1");
    }
}
