use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Webhook topic, parsed from the `X-Shopify-Topic` header.
///
/// Topics the sync core does not act on are preserved verbatim in
/// `Other` so they can be logged and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    InventoryLevelsUpdate,
    OrdersPaid,
    OrdersCancelled,
    RefundsCreate,
    Other(String),
}

impl Topic {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "inventory_levels/update" => Topic::InventoryLevelsUpdate,
            "orders/paid" => Topic::OrdersPaid,
            "orders/cancelled" => Topic::OrdersCancelled,
            "refunds/create" => Topic::RefundsCreate,
            other => Topic::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Topic::InventoryLevelsUpdate => "inventory_levels/update",
            Topic::OrdersPaid => "orders/paid",
            Topic::OrdersCancelled => "orders/cancelled",
            Topic::RefundsCreate => "refunds/create",
            Topic::Other(raw) => raw,
        }
    }

    /// Order-family topics key their dedup entries off the order, not an
    /// inventory item.
    pub fn is_order_family(&self) -> bool {
        matches!(
            self,
            Topic::OrdersPaid | Topic::OrdersCancelled | Topic::RefundsCreate
        )
    }
}

/// Key identifying one logical event inside the dedup window.
///
/// Two deliveries with equal keys within the window TTL are the same
/// logical event; only the first reaches a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(pub String);

impl DedupKey {
    /// Derive the key from the topic and the parsed payload.
    ///
    /// Order-family payloads are keyed on the order identifier plus its
    /// creation timestamp (refunds carry `order_id` instead of `id`);
    /// everything else is keyed on the inventory item plus `updated_at`.
    /// Absent fields hash as empty strings, which degrades to a coarser
    /// key rather than rejecting the event.
    pub fn derive(topic: &Topic, payload: &serde_json::Value) -> Self {
        let (id, stamp) = if topic.is_order_family() {
            let id = payload
                .get("order_id")
                .or_else(|| payload.get("id"))
                .map(json_scalar)
                .unwrap_or_default();
            let stamp = payload
                .get("created_at")
                .or_else(|| payload.get("name"))
                .map(json_scalar)
                .unwrap_or_default();
            (id, stamp)
        } else {
            let id = payload
                .get("inventory_item_id")
                .map(json_scalar)
                .unwrap_or_default();
            let stamp = payload.get("updated_at").map(json_scalar).unwrap_or_default();
            (id, stamp)
        };

        let mut hasher = Sha256::new();
        hasher.update(topic.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(id.as_bytes());
        hasher.update(b"|");
        hasher.update(stamp.as_bytes());
        DedupKey(hex::encode(hasher.finalize()))
    }
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A self-caused inventory change registered in advance so its echo
/// webhook can be ignored.
///
/// Matched on exact `(sku, location_id, expected_quantity)` and consumed
/// on first match. Expires unconsumed after the configured TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryExpectation {
    pub sku: String,
    pub location_id: i64,
    pub expected_quantity: i64,
    pub reason: Option<String>,
    pub created_at_secs: u64,
    pub expires_at_secs: u64,
}

/// Index entry mapping a ledger item code to a quantity-adjustment bill.
///
/// Written when an adjustment bill posts, removed when that bill is
/// voided. Lets a later recompute bulk-void every bill that touched an
/// item's on-hand quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBillRecord {
    pub item_code: String,
    pub invoice_id: String,
    pub quantity: f64,
    pub reference: Option<String>,
    pub synced_at_secs: u64,
}

/// One row of the status page's recent-activity list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub inventory_item_id: i64,
    pub available: i64,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// `inventory_levels/update` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryLevelPayload {
    pub inventory_item_id: i64,
    pub location_id: i64,
    pub available: i64,
    #[serde(default)]
    pub updated_at: String,
}

/// Order payload shared by `orders/paid` and `orders/cancelled`.
///
/// Only the fields the handlers read are modeled; the rest of the
/// (large) order object is ignored by serde.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub customer: Option<CustomerPayload>,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
    #[serde(default)]
    pub shipping_lines: Vec<ShippingLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerPayload {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl CustomerPayload {
    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        let joined = format!("{first} {last}");
        let joined = joined.trim();
        if joined.is_empty() {
            None
        } else {
            Some(joined.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineItem {
    pub title: String,
    pub quantity: i64,
    /// Unit price as a decimal string, upstream convention.
    pub price: String,
    #[serde(default)]
    pub total_discount: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingLine {
    pub title: String,
    pub price: String,
}

/// `refunds/create` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundPayload {
    pub id: i64,
    pub order_id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundLineItem {
    pub quantity: i64,
    pub line_item: OrderLineItem,
}

// ---------------------------------------------------------------------------
// Ledger-side views
// ---------------------------------------------------------------------------

/// Ledger item as the handlers see it.
#[derive(Debug, Clone)]
pub struct LedgerItem {
    pub item_id: String,
    pub code: String,
    pub quantity_on_hand: Option<f64>,
}

/// Ledger invoice as the handlers see it.
#[derive(Debug, Clone)]
pub struct LedgerInvoice {
    pub invoice_id: String,
    pub reference: Option<String>,
    pub status: InvoiceStatus,
    pub total: f64,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
}

/// Invoice lifecycle states the sync core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Authorised,
    Paid,
    Voided,
    Other,
}

impl InvoiceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "DRAFT" | "SUBMITTED" => InvoiceStatus::Draft,
            "AUTHORISED" => InvoiceStatus::Authorised,
            "PAID" => InvoiceStatus::Paid,
            "VOIDED" | "DELETED" => InvoiceStatus::Voided,
            _ => InvoiceStatus::Other,
        }
    }

    /// Whether a cancellation may void an invoice in this state.
    pub fn voidable(&self) -> bool {
        matches!(self, InvoiceStatus::Authorised | InvoiceStatus::Paid)
    }
}

/// New tracked item to create in the ledger.
#[derive(Debug, Clone)]
pub struct NewLedgerItem {
    pub code: String,
    pub name: String,
    pub description: String,
    pub purchase_description: String,
    pub quantity_on_hand: i64,
    pub purchase_unit_price: f64,
    pub sales_unit_price: f64,
    pub inventory_asset_account: String,
    pub cogs_account: String,
    pub sales_account: String,
}

/// New sales invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub reference: String,
    pub contact_name: String,
    pub date: String,
    pub lines: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: f64,
    pub unit_amount: f64,
    pub account_code: String,
}

/// New quantity-adjustment bill against a tracked item.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub item_code: String,
    pub quantity: f64,
    pub unit_amount: f64,
    pub reference: String,
    pub date: String,
}

/// New credit note allocated against an existing invoice.
#[derive(Debug, Clone)]
pub struct NewCreditNote {
    pub invoice_id: String,
    pub reference: String,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub date: String,
    pub lines: Vec<InvoiceLine>,
}
