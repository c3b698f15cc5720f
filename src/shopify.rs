use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SyncConfig;
use crate::error::SyncError;

const API_VERSION: &str = "2024-04";

/// Variant details resolved from an inventory item id.
#[derive(Debug, Clone)]
pub struct ResolvedVariant {
    pub sku: Option<String>,
    pub title: Option<String>,
    pub price: f64,
    pub product_gid: String,
}

/// Product details resolved from a product id.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProduct {
    pub title: Option<String>,
    pub body_html: Option<String>,
}

/// Upstream commerce lookups the sync handlers depend on.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Inventory item id → owning variant, or None if the platform no
    /// longer knows the item.
    async fn resolve_variant(
        &self,
        inventory_item_id: i64,
    ) -> Result<Option<ResolvedVariant>, SyncError>;

    /// Product gid → title and description HTML.
    async fn resolve_product(&self, product_gid: &str) -> Result<ResolvedProduct, SyncError>;

    /// Per-unit purchase cost of an inventory item, 0.0 when the
    /// platform has none recorded.
    async fn resolve_unit_cost(
        &self,
        product_gid: &str,
        inventory_item_id: i64,
    ) -> Result<f64, SyncError>;

    /// Numeric order id → human-readable order name (`#1001`).
    /// Refund payloads only carry the numeric id.
    async fn resolve_order_reference(&self, order_id: i64) -> Result<Option<String>, SyncError>;
}

/// Admin-API client for the commerce platform.
pub struct ShopifyClient {
    http: reqwest::Client,
    domain: String,
    access_token: String,
    app_server: String,
}

impl ShopifyClient {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            domain: config.shopify_store_domain.clone(),
            access_token: config.shopify_access_token.clone(),
            app_server: config.shopify_app_server.clone(),
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("https://{}/admin/api/{}/{}", self.domain, API_VERSION, path)
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, SyncError> {
        let response = self
            .http
            .post(self.rest_url("graphql.json"))
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = if status.is_success() {
            response.json().await?
        } else {
            return Err(SyncError::Downstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        };

        if let Some(errors) = body.get("errors") {
            return Err(SyncError::Downstream {
                status: status.as_u16(),
                body: errors.to_string(),
            });
        }

        Ok(body)
    }

    async fn rest_get(&self, path: &str) -> Result<Option<Value>, SyncError> {
        let response = self
            .http
            .get(self.rest_url(path))
            .header("X-Shopify-Access-Token", &self.access_token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SyncError::Downstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(Some(response.json().await?))
    }

    /// Register the webhook subscriptions this service needs, skipping
    /// any that already point at us. Called once at startup; failures
    /// are surfaced to the caller and are not fatal to the process.
    pub async fn ensure_webhooks_registered(&self) -> Result<(), SyncError> {
        let subscriptions = [
            ("inventory_levels/update", "webhook/inventory"),
            ("orders/paid", "webhook/inventory/orders"),
            ("orders/cancelled", "webhook/inventory/orders"),
            ("refunds/create", "webhook/inventory/orders"),
        ];

        let existing = self
            .rest_get("webhooks.json")
            .await?
            .unwrap_or_else(|| json!({}));
        let registered: Vec<(String, String)> = existing
            .get("webhooks")
            .and_then(Value::as_array)
            .map(|hooks| {
                hooks
                    .iter()
                    .filter_map(|hook| {
                        Some((
                            hook.get("topic")?.as_str()?.to_string(),
                            hook.get("address")?.as_str()?.to_string(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (topic, path) in subscriptions {
            let address = format!("{}/{}", self.app_server.trim_end_matches('/'), path);
            let already = registered
                .iter()
                .any(|(t, a)| t == topic && a == &address);
            if already {
                continue;
            }

            let response = self
                .http
                .post(self.rest_url("webhooks.json"))
                .header("X-Shopify-Access-Token", &self.access_token)
                .json(&json!({
                    "webhook": { "topic": topic, "address": address, "format": "json" }
                }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SyncError::Downstream {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            tracing::info!(topic, "registered webhook subscription");
        }

        Ok(())
    }
}

#[async_trait]
impl CommerceApi for ShopifyClient {
    async fn resolve_variant(
        &self,
        inventory_item_id: i64,
    ) -> Result<Option<ResolvedVariant>, SyncError> {
        let query = r#"
            query ($inventoryItemId: ID!) {
              inventoryItem(id: $inventoryItemId) {
                id
                variant {
                  id
                  sku
                  title
                  price
                  product { id title }
                }
              }
            }
        "#;
        let gid = format!("gid://shopify/InventoryItem/{inventory_item_id}");
        let body = self
            .graphql(query, json!({ "inventoryItemId": gid }))
            .await?;

        let Some(variant) = body.pointer("/data/inventoryItem/variant") else {
            return Ok(None);
        };
        if variant.is_null() {
            return Ok(None);
        }

        Ok(Some(ResolvedVariant {
            sku: variant
                .get("sku")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            title: variant
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string),
            price: variant
                .get("price")
                .and_then(Value::as_str)
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            product_gid: variant
                .pointer("/product/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    async fn resolve_product(&self, product_gid: &str) -> Result<ResolvedProduct, SyncError> {
        let Some(product_id) = extract_id_from_gid(product_gid) else {
            return Ok(ResolvedProduct::default());
        };
        let body = self
            .rest_get(&format!("products/{product_id}.json"))
            .await?;
        let Some(product) = body.as_ref().and_then(|b| b.get("product")) else {
            return Ok(ResolvedProduct::default());
        };

        Ok(ResolvedProduct {
            title: product
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string),
            body_html: product
                .get("body_html")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn resolve_unit_cost(
        &self,
        product_gid: &str,
        inventory_item_id: i64,
    ) -> Result<f64, SyncError> {
        let query = r#"
            query ($id: ID!) {
              product(id: $id) {
                variants(first: 50) {
                  nodes {
                    id
                    inventoryItem {
                      id
                      unitCost { amount }
                    }
                  }
                }
              }
            }
        "#;
        let body = self.graphql(query, json!({ "id": product_gid })).await?;

        let wanted = format!("gid://shopify/InventoryItem/{inventory_item_id}");
        let cost = body
            .pointer("/data/product/variants/nodes")
            .and_then(Value::as_array)
            .and_then(|nodes| {
                nodes.iter().find(|node| {
                    node.pointer("/inventoryItem/id").and_then(Value::as_str) == Some(&wanted)
                })
            })
            .and_then(|node| node.pointer("/inventoryItem/unitCost/amount"))
            .and_then(Value::as_str)
            .and_then(|amount| amount.parse().ok())
            .unwrap_or(0.0);

        Ok(cost)
    }

    async fn resolve_order_reference(&self, order_id: i64) -> Result<Option<String>, SyncError> {
        let body = self
            .rest_get(&format!("orders/{order_id}.json?fields=name"))
            .await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/order/name"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

fn extract_id_from_gid(gid: &str) -> Option<&str> {
    gid.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Strip HTML tags from a product description.
///
/// The ledger's description fields are plain text; this keeps the text
/// content and drops markup without pulling in a full HTML parser.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
