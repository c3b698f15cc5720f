use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::error::{HandlerOutcome, SyncError};
use crate::expectation::ExpectationLedger;
use crate::shopify::{strip_html, CommerceApi};
use crate::store::{now_secs, SyncStore};
use crate::types::{
    InventoryLevelPayload, InvoiceLine, ItemBillRecord, NewBill, NewCreditNote, NewInvoice,
    NewLedgerItem, OrderPayload, RefundPayload,
};
use crate::xero::{today, LedgerApi};

const FALLBACK_CONTACT: &str = "Shopify Customer";
const MAX_DESCRIPTION_CHARS: usize = 4000;

/// Translates verified commerce events into ledger operations.
///
/// Every handler is idempotent against the ledger's own state: it looks
/// up what the ledger already has before creating anything, so a
/// duplicate that slips past the dedup window cannot double-post.
pub struct SyncHandlers {
    config: SyncConfig,
    store: Arc<dyn SyncStore>,
    commerce: Arc<dyn CommerceApi>,
    ledger: Arc<dyn LedgerApi>,
    expectations: ExpectationLedger,
    pending_payments: PendingPayments,
}

impl SyncHandlers {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn SyncStore>,
        commerce: Arc<dyn CommerceApi>,
        ledger: Arc<dyn LedgerApi>,
    ) -> Self {
        let expectations = ExpectationLedger::new(store.clone(), config.expectation_ttl);
        Self {
            config,
            store,
            commerce,
            ledger,
            expectations,
            pending_payments: PendingPayments::default(),
        }
    }

    pub fn expectations(&self) -> &ExpectationLedger {
        &self.expectations
    }

    pub fn pending_payments(&self) -> PendingPayments {
        self.pending_payments.clone()
    }

    /// `inventory_levels/update`: create the ledger item on first sight,
    /// otherwise reconcile a quantity increase with an adjustment bill.
    pub async fn handle_inventory_update(
        &self,
        payload: InventoryLevelPayload,
    ) -> Result<HandlerOutcome, SyncError> {
        let variant = self
            .commerce
            .resolve_variant(payload.inventory_item_id)
            .await?;

        let Some(variant) = variant else {
            return Err(SyncError::resolution(
                "variant for inventory item",
                payload.inventory_item_id,
            ));
        };
        let Some(sku) = variant.sku.clone() else {
            tracing::warn!(
                inventory_item_id = payload.inventory_item_id,
                "variant has no SKU, skipping"
            );
            return Ok(HandlerOutcome::skipped("variant has no SKU"));
        };

        // Our own outbound write echoing back?
        if let Some(expectation) = self
            .expectations
            .check_and_consume(&sku, payload.location_id, payload.available)
            .await
        {
            tracing::info!(
                %sku,
                location_id = payload.location_id,
                reason = expectation.reason.as_deref().unwrap_or(""),
                "inventory change was expected, not syncing"
            );
            return Ok(HandlerOutcome::ExpectedChange {
                reason: expectation.reason,
            });
        }

        let code = self.config.item_code(&sku);
        match self.ledger.find_item_by_code(&code).await? {
            None => {
                let product = self.commerce.resolve_product(&variant.product_gid).await?;
                let unit_cost = self
                    .commerce
                    .resolve_unit_cost(&variant.product_gid, payload.inventory_item_id)
                    .await?;

                let name = product
                    .title
                    .or(variant.title)
                    .unwrap_or_else(|| "Unnamed".to_string());
                let description = product
                    .body_html
                    .as_deref()
                    .map(strip_html)
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "Imported from Shopify".to_string());
                let description: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();

                let created = self
                    .ledger
                    .create_item(&NewLedgerItem {
                        code: code.clone(),
                        name: name.clone(),
                        description,
                        purchase_description: format!("Imported: {name}"),
                        quantity_on_hand: payload.available,
                        purchase_unit_price: unit_cost,
                        sales_unit_price: variant.price,
                        inventory_asset_account: self.config.inventory_asset_account.clone(),
                        cogs_account: self.config.cogs_account.clone(),
                        sales_account: self.config.sales_account.clone(),
                    })
                    .await?;
                tracing::info!(code = %created.code, "created ledger item");
                Ok(HandlerOutcome::Synced)
            }
            Some(item) => {
                let ledger_quantity = self.ledger.item_quantity(&item.item_id).await?;
                let diff = payload.available as f64 - ledger_quantity;
                if diff <= 0.0 {
                    // Decreases are not reconciled automatically; the
                    // bill index stays available for a manual recompute.
                    tracing::info!(
                        %code,
                        available = payload.available,
                        ledger_quantity,
                        "no quantity increase, skipping"
                    );
                    return Ok(HandlerOutcome::skipped("no quantity increase"));
                }

                let unit_cost = self
                    .commerce
                    .resolve_unit_cost(&variant.product_gid, payload.inventory_item_id)
                    .await?;
                let reference = format!("Stock adjustment {code}");
                let bill = self
                    .ledger
                    .create_bill(&NewBill {
                        item_code: code.clone(),
                        quantity: diff,
                        unit_amount: unit_cost,
                        reference: reference.clone(),
                        date: today(),
                    })
                    .await?;

                self.store
                    .save_item_bill(&ItemBillRecord {
                        item_code: code.clone(),
                        invoice_id: bill.invoice_id,
                        quantity: diff,
                        reference: Some(reference),
                        synced_at_secs: now_secs(),
                    })
                    .await;
                tracing::info!(%code, quantity = diff, "posted adjustment bill");
                Ok(HandlerOutcome::Synced)
            }
        }
    }

    /// `orders/paid`: one invoice per order reference, paid in full.
    pub async fn handle_order_paid(&self, order: OrderPayload) -> Result<HandlerOutcome, SyncError> {
        if let Some(existing) = self.ledger.find_invoice_by_reference(&order.name).await? {
            tracing::info!(
                reference = %order.name,
                invoice_id = %existing.invoice_id,
                "invoice already exists, skipping"
            );
            return Ok(HandlerOutcome::skipped("invoice already exists"));
        }

        let lines = order_invoice_lines(&order, &self.config.sales_account);
        if lines.is_empty() {
            return Ok(HandlerOutcome::skipped("order has no billable lines"));
        }

        let contact_name = order
            .customer
            .as_ref()
            .and_then(|c| c.full_name())
            .unwrap_or_else(|| FALLBACK_CONTACT.to_string());

        let invoice = self
            .ledger
            .create_invoice(&NewInvoice {
                reference: order.name.clone(),
                contact_name,
                date: today(),
                lines,
            })
            .await?;
        tracing::info!(
            reference = %order.name,
            invoice_id = %invoice.invoice_id,
            total = invoice.total,
            "created invoice"
        );

        // Orders on this platform are paid at order time, so the ledger
        // entry should read paid, not outstanding.
        if invoice.total > 0.0 {
            if let Err(err) = self
                .ledger
                .create_payment(&invoice.invoice_id, invoice.total)
                .await
            {
                tracing::error!(
                    invoice_id = %invoice.invoice_id,
                    error = %err,
                    "payment recording failed, queued for sweep"
                );
                self.pending_payments
                    .push(invoice.invoice_id.clone(), invoice.total)
                    .await;
            }
        }

        Ok(HandlerOutcome::Synced)
    }

    /// `orders/cancelled`: void the matching invoice if it is still in a
    /// voidable state.
    pub async fn handle_order_cancelled(
        &self,
        order: OrderPayload,
    ) -> Result<HandlerOutcome, SyncError> {
        let Some(invoice) = self.ledger.find_invoice_by_reference(&order.name).await? else {
            tracing::info!(reference = %order.name, "no invoice for cancelled order");
            return Ok(HandlerOutcome::skipped("no invoice for order"));
        };

        if !invoice.status.voidable() {
            tracing::info!(
                reference = %order.name,
                status = ?invoice.status,
                "invoice not voidable, skipping"
            );
            return Ok(HandlerOutcome::skipped("invoice not voidable"));
        }

        self.ledger.void_invoice(&invoice.invoice_id).await?;
        tracing::info!(
            reference = %order.name,
            invoice_id = %invoice.invoice_id,
            "voided invoice"
        );
        Ok(HandlerOutcome::Synced)
    }

    /// `refunds/create`: credit note mirroring the refunded lines,
    /// allocated against the original invoice.
    pub async fn handle_refund(&self, refund: RefundPayload) -> Result<HandlerOutcome, SyncError> {
        let Some(reference) = self
            .commerce
            .resolve_order_reference(refund.order_id)
            .await?
        else {
            return Err(SyncError::resolution("order", refund.order_id));
        };

        let Some(invoice) = self.ledger.find_invoice_by_reference(&reference).await? else {
            tracing::info!(%reference, "no invoice for refund, skipping");
            return Ok(HandlerOutcome::skipped("no invoice for order"));
        };

        let lines: Vec<InvoiceLine> = refund
            .refund_line_items
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| InvoiceLine {
                description: line.line_item.title.clone(),
                quantity: line.quantity as f64,
                unit_amount: round2(parse_amount(&line.line_item.price)),
                account_code: self.config.sales_account.clone(),
            })
            .collect();
        if lines.is_empty() {
            return Ok(HandlerOutcome::skipped("refund has no line items"));
        }

        // Reuse the invoice's contact when it still exists; otherwise
        // the note is raised against the name.
        let contact_id = match &invoice.contact_id {
            Some(id) if self.ledger.contact_exists(id).await? => Some(id.clone()),
            _ => None,
        };

        self.ledger
            .create_credit_note(&NewCreditNote {
                invoice_id: invoice.invoice_id.clone(),
                reference: reference.clone(),
                contact_id,
                contact_name: invoice.contact_name.clone(),
                date: today(),
                lines,
            })
            .await?;
        tracing::info!(
            %reference,
            invoice_id = %invoice.invoice_id,
            "created credit note"
        );
        Ok(HandlerOutcome::Synced)
    }

    /// Void every adjustment bill recorded for an item and drop the
    /// records. Support operation for recomputing an item's quantity
    /// from scratch; not reachable from the webhook path.
    pub async fn void_bills_for_item(&self, item_code: &str) -> Result<usize, SyncError> {
        let bills = self.store.bills_for_item(item_code).await;
        let mut voided = 0usize;
        for bill in bills {
            self.ledger.void_invoice(&bill.invoice_id).await?;
            self.store.remove_item_bill(&bill.invoice_id).await;
            voided += 1;
        }
        Ok(voided)
    }
}

/// Queue of payments that failed to record after invoice creation.
///
/// Drained by the background sweep; entries are in-process only and do
/// not survive restart.
#[derive(Clone, Default)]
pub struct PendingPayments {
    queue: Arc<Mutex<VecDeque<PendingPayment>>>,
}

#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub invoice_id: String,
    pub amount: f64,
    pub attempts: u32,
}

impl PendingPayments {
    pub async fn push(&self, invoice_id: String, amount: f64) {
        self.queue.lock().await.push_back(PendingPayment {
            invoice_id,
            amount,
            attempts: 0,
        });
    }

    pub async fn take_all(&self) -> Vec<PendingPayment> {
        self.queue.lock().await.drain(..).collect()
    }

    pub async fn requeue(&self, payment: PendingPayment) {
        self.queue.lock().await.push_back(payment);
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

fn order_invoice_lines(order: &OrderPayload, sales_account: &str) -> Vec<InvoiceLine> {
    let mut lines: Vec<InvoiceLine> = order
        .line_items
        .iter()
        .filter(|line| line.quantity > 0)
        .map(|line| InvoiceLine {
            description: line.title.clone(),
            quantity: line.quantity as f64,
            unit_amount: line_unit_price(
                parse_amount(&line.price),
                line.quantity,
                line.total_discount.as_deref().map(parse_amount).unwrap_or(0.0),
            ),
            account_code: sales_account.to_string(),
        })
        .collect();

    for shipping in &order.shipping_lines {
        let amount = parse_amount(&shipping.price);
        if amount > 0.0 {
            lines.push(InvoiceLine {
                description: format!("Shipping: {}", shipping.title),
                quantity: 1.0,
                unit_amount: round2(amount),
                account_code: sales_account.to_string(),
            });
        }
    }

    lines
}

/// Per-unit price after spreading the line's total discount:
/// `(price × qty − discount) / qty`, rounded to 2 decimals.
fn line_unit_price(price: f64, quantity: i64, total_discount: f64) -> f64 {
    if quantity <= 0 {
        return 0.0;
    }
    round2((price * quantity as f64 - total_discount) / quantity as f64)
}

fn parse_amount(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
