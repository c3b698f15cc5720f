//! Webhook-driven sync between a Shopify store and a Xero ledger.
//!
//! This crate receives the store's webhooks (inventory levels, paid and
//! cancelled orders, refunds), authenticates them, and reconciles each
//! logical event into the ledger exactly once: items are created or
//! adjusted, paid orders become paid invoices, cancellations void them,
//! refunds raise credit notes.
//!
//! ## Guarantees
//! - Fail-closed signature verification over the raw body bytes
//! - At-most-once handler dispatch per logical event within the dedup
//!   window
//! - Ledger-side idempotency in every handler (lookup before create),
//!   independent of the dedup window
//! - Self-caused inventory echoes are suppressed via single-use
//!   expectations
//!
//! ## Non-Guarantees
//! - Durability of dedup/expectation state across restarts (in-memory
//!   store; the Redis backend narrows this)
//! - Exactly-once delivery
//! - Ordering between deliveries; handlers re-derive truth from the
//!   ledger instead
//! - Multi-tenant support

mod config;
mod dedup;
mod error;
mod expectation;
mod handlers;
mod router;
mod server;
mod shopify;
mod signing;
mod store;
mod tasks;
mod token;
mod types;
mod xero;

#[cfg(feature = "redis")]
mod store_redis;

pub use config::SyncConfig;
pub use dedup::DedupWindow;
pub use error::{HandlerOutcome, SyncError};
pub use expectation::ExpectationLedger;
pub use handlers::{PendingPayment, PendingPayments, SyncHandlers};
pub use router::{EventRouter, InboundEvent, RouterResponse};
pub use server::{app, AppState};
pub use shopify::{CommerceApi, ResolvedProduct, ResolvedVariant, ShopifyClient};
pub use signing::{compute_signature, verify_signature, verify_webhook_request, SignatureError};
pub use store::{InMemoryStore, SyncStore};
pub use tasks::{spawn_compaction, spawn_payment_sweep, sweep_pending_payments};
pub use token::{Credentials, InMemoryTokenStore, StoredToken, TokenStore, XeroAuthClient};
pub use types::{
    CustomerPayload, DedupKey, InventoryExpectation, InventoryLevelPayload, InvoiceLine,
    InvoiceStatus, ItemBillRecord, LedgerInvoice, LedgerItem, NewBill, NewCreditNote, NewInvoice,
    NewLedgerItem, OrderLineItem, OrderPayload, RefundLineItem, RefundPayload, ShippingLine,
    SyncLogEntry, Topic,
};
pub use xero::{LedgerApi, XeroClient};

#[cfg(feature = "redis")]
pub use store_redis::RedisStore;
