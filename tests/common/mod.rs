#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use shopify_xero_sync::{
    CommerceApi, EventRouter, InMemoryStore, InvoiceStatus, LedgerApi, LedgerInvoice, LedgerItem,
    NewBill, NewCreditNote, NewInvoice, NewLedgerItem, ResolvedProduct, ResolvedVariant,
    SyncConfig, SyncError, SyncHandlers, SyncStore,
};

pub const TEST_SECRET: &str = "shpss_test_secret";

/// Commerce collaborator backed by maps, recording every call.
#[derive(Default)]
pub struct MockCommerce {
    pub variants: Mutex<HashMap<i64, ResolvedVariant>>,
    pub products: Mutex<HashMap<String, ResolvedProduct>>,
    pub unit_costs: Mutex<HashMap<i64, f64>>,
    pub order_names: Mutex<HashMap<i64, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockCommerce {
    pub async fn add_variant(&self, inventory_item_id: i64, sku: Option<&str>, price: f64) {
        self.variants.lock().await.insert(
            inventory_item_id,
            ResolvedVariant {
                sku: sku.map(str::to_string),
                title: Some("Test Variant".to_string()),
                price,
                product_gid: "gid://shopify/Product/100".to_string(),
            },
        );
    }

    pub async fn add_order_name(&self, order_id: i64, name: &str) {
        self.order_names
            .lock()
            .await
            .insert(order_id, name.to_string());
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl CommerceApi for MockCommerce {
    async fn resolve_variant(
        &self,
        inventory_item_id: i64,
    ) -> Result<Option<ResolvedVariant>, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("resolve_variant:{inventory_item_id}"));
        Ok(self.variants.lock().await.get(&inventory_item_id).cloned())
    }

    async fn resolve_product(&self, product_gid: &str) -> Result<ResolvedProduct, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("resolve_product:{product_gid}"));
        Ok(self
            .products
            .lock()
            .await
            .get(product_gid)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_unit_cost(
        &self,
        _product_gid: &str,
        inventory_item_id: i64,
    ) -> Result<f64, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("resolve_unit_cost:{inventory_item_id}"));
        Ok(self
            .unit_costs
            .lock()
            .await
            .get(&inventory_item_id)
            .copied()
            .unwrap_or(0.0))
    }

    async fn resolve_order_reference(&self, order_id: i64) -> Result<Option<String>, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("resolve_order_reference:{order_id}"));
        Ok(self.order_names.lock().await.get(&order_id).cloned())
    }
}

/// Ledger collaborator holding its own state, recording every call.
#[derive(Default)]
pub struct MockLedger {
    pub items: Mutex<HashMap<String, LedgerItem>>,
    pub quantities: Mutex<HashMap<String, f64>>,
    pub invoices: Mutex<Vec<LedgerInvoice>>,
    pub bills: Mutex<Vec<NewBill>>,
    pub payments: Mutex<Vec<(String, f64)>>,
    pub credit_notes: Mutex<Vec<NewCreditNote>>,
    pub contacts: Mutex<HashSet<String>>,
    pub voided: Mutex<Vec<String>>,
    pub fail_payments: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockLedger {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Seed a tracked item with an on-hand quantity.
    pub async fn seed_item(&self, code: &str, quantity: f64) -> String {
        let item_id = self.next_id("item");
        self.items.lock().await.insert(
            code.to_string(),
            LedgerItem {
                item_id: item_id.clone(),
                code: code.to_string(),
                quantity_on_hand: Some(quantity),
            },
        );
        self.quantities.lock().await.insert(item_id.clone(), quantity);
        item_id
    }

    /// Seed an existing sales invoice.
    pub async fn seed_invoice(
        &self,
        reference: &str,
        status: InvoiceStatus,
        total: f64,
        contact_id: Option<&str>,
    ) -> String {
        let invoice_id = self.next_id("inv");
        self.invoices.lock().await.push(LedgerInvoice {
            invoice_id: invoice_id.clone(),
            reference: Some(reference.to_string()),
            status,
            total,
            contact_id: contact_id.map(str::to_string),
            contact_name: Some("Jane Doe".to_string()),
        });
        invoice_id
    }

    pub async fn add_contact(&self, contact_id: &str) {
        self.contacts.lock().await.insert(contact_id.to_string());
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn invoice_status(&self, invoice_id: &str) -> Option<InvoiceStatus> {
        self.invoices
            .lock()
            .await
            .iter()
            .find(|inv| inv.invoice_id == invoice_id)
            .map(|inv| inv.status)
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn find_item_by_code(&self, code: &str) -> Result<Option<LedgerItem>, SyncError> {
        self.calls.lock().await.push(format!("find_item:{code}"));
        Ok(self.items.lock().await.get(code).cloned())
    }

    async fn create_item(&self, item: &NewLedgerItem) -> Result<LedgerItem, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("create_item:{}", item.code));
        let item_id = self.next_id("item");
        let created = LedgerItem {
            item_id: item_id.clone(),
            code: item.code.clone(),
            quantity_on_hand: Some(item.quantity_on_hand as f64),
        };
        self.items
            .lock()
            .await
            .insert(item.code.clone(), created.clone());
        self.quantities
            .lock()
            .await
            .insert(item_id, item.quantity_on_hand as f64);
        Ok(created)
    }

    async fn item_quantity(&self, item_id: &str) -> Result<f64, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("item_quantity:{item_id}"));
        Ok(self
            .quantities
            .lock()
            .await
            .get(item_id)
            .copied()
            .unwrap_or(0.0))
    }

    async fn find_invoice_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerInvoice>, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("find_invoice:{reference}"));
        Ok(self
            .invoices
            .lock()
            .await
            .iter()
            .find(|inv| inv.reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<LedgerInvoice, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("create_invoice:{}", invoice.reference));
        let total: f64 = invoice
            .lines
            .iter()
            .map(|line| line.quantity * line.unit_amount)
            .sum();
        let created = LedgerInvoice {
            invoice_id: self.next_id("inv"),
            reference: Some(invoice.reference.clone()),
            status: InvoiceStatus::Authorised,
            total,
            contact_id: None,
            contact_name: Some(invoice.contact_name.clone()),
        };
        self.invoices.lock().await.push(created.clone());
        Ok(created)
    }

    async fn create_bill(&self, bill: &NewBill) -> Result<LedgerInvoice, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("create_bill:{}", bill.item_code));
        self.bills.lock().await.push(bill.clone());
        Ok(LedgerInvoice {
            invoice_id: self.next_id("bill"),
            reference: Some(bill.reference.clone()),
            status: InvoiceStatus::Authorised,
            total: bill.quantity * bill.unit_amount,
            contact_id: None,
            contact_name: None,
        })
    }

    async fn void_invoice(&self, invoice_id: &str) -> Result<(), SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("void_invoice:{invoice_id}"));
        self.voided.lock().await.push(invoice_id.to_string());
        let mut invoices = self.invoices.lock().await;
        if let Some(invoice) = invoices.iter_mut().find(|inv| inv.invoice_id == invoice_id) {
            invoice.status = InvoiceStatus::Voided;
        }
        Ok(())
    }

    async fn create_payment(&self, invoice_id: &str, amount: f64) -> Result<(), SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("create_payment:{invoice_id}"));
        if self.fail_payments.load(Ordering::SeqCst) {
            return Err(SyncError::Downstream {
                status: 503,
                body: "payments service unavailable".to_string(),
            });
        }
        self.payments
            .lock()
            .await
            .push((invoice_id.to_string(), amount));
        let mut invoices = self.invoices.lock().await;
        if let Some(invoice) = invoices.iter_mut().find(|inv| inv.invoice_id == invoice_id) {
            invoice.status = InvoiceStatus::Paid;
        }
        Ok(())
    }

    async fn create_credit_note(&self, note: &NewCreditNote) -> Result<(), SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("create_credit_note:{}", note.reference));
        self.credit_notes.lock().await.push(note.clone());
        Ok(())
    }

    async fn contact_exists(&self, contact_id: &str) -> Result<bool, SyncError> {
        self.calls
            .lock()
            .await
            .push(format!("contact_exists:{contact_id}"));
        Ok(self.contacts.lock().await.contains(contact_id))
    }
}

/// Config wired for tests: signature secret set, everything else
/// defaulted.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        shopify_api_secret: TEST_SECRET.to_string(),
        ..SyncConfig::default()
    }
}

pub struct TestHarness {
    pub router: EventRouter,
    pub handlers_store: Arc<InMemoryStore>,
    pub commerce: Arc<MockCommerce>,
    pub ledger: Arc<MockLedger>,
}

/// Wire a router over mocks and the in-memory store.
pub fn build_router(config: SyncConfig) -> TestHarness {
    let store = Arc::new(InMemoryStore::new());
    let commerce = Arc::new(MockCommerce::default());
    let ledger = Arc::new(MockLedger::default());

    let handlers = SyncHandlers::new(
        config.clone(),
        store.clone() as Arc<dyn SyncStore>,
        commerce.clone(),
        ledger.clone(),
    );
    let router = EventRouter::new(&config, store.clone() as Arc<dyn SyncStore>, handlers);

    TestHarness {
        router,
        handlers_store: store,
        commerce,
        ledger,
    }
}

pub struct HandlerHarness {
    pub handlers: SyncHandlers,
    pub store: Arc<InMemoryStore>,
    pub commerce: Arc<MockCommerce>,
    pub ledger: Arc<MockLedger>,
}

/// Wire handlers directly, bypassing the router.
pub fn build_handlers(config: SyncConfig) -> HandlerHarness {
    let store = Arc::new(InMemoryStore::new());
    let commerce = Arc::new(MockCommerce::default());
    let ledger = Arc::new(MockLedger::default());

    let handlers = SyncHandlers::new(
        config,
        store.clone() as Arc<dyn SyncStore>,
        commerce.clone(),
        ledger.clone(),
    );

    HandlerHarness {
        handlers,
        store,
        commerce,
        ledger,
    }
}
