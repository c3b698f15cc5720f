use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::token::XeroAuthClient;
use crate::types::{
    InvoiceStatus, LedgerInvoice, LedgerItem, NewBill, NewCreditNote, NewInvoice, NewLedgerItem,
};

const BASE_URL: &str = "https://api.xero.com/api.xro/2.0";

/// Contact that quantity-adjustment bills are raised against.
const BILL_CONTACT: &str = "Inventory Adjustments";

/// Ledger operations the sync handlers depend on.
///
/// "Already exists" and "already voided" are not errors at this seam:
/// the find methods expose current state and handlers decide.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn find_item_by_code(&self, code: &str) -> Result<Option<LedgerItem>, SyncError>;
    async fn create_item(&self, item: &NewLedgerItem) -> Result<LedgerItem, SyncError>;

    /// Current on-hand quantity of a tracked item.
    async fn item_quantity(&self, item_id: &str) -> Result<f64, SyncError>;

    async fn find_invoice_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerInvoice>, SyncError>;
    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<LedgerInvoice, SyncError>;

    /// Post a quantity-increasing bill against a tracked item.
    async fn create_bill(&self, bill: &NewBill) -> Result<LedgerInvoice, SyncError>;

    async fn void_invoice(&self, invoice_id: &str) -> Result<(), SyncError>;

    /// Record a payment for the full given amount against an invoice.
    async fn create_payment(&self, invoice_id: &str, amount: f64) -> Result<(), SyncError>;

    /// Create a credit note and allocate it against the original
    /// invoice.
    async fn create_credit_note(&self, note: &NewCreditNote) -> Result<(), SyncError>;

    async fn contact_exists(&self, contact_id: &str) -> Result<bool, SyncError>;
}

/// Accounting-API client for the ledger platform.
pub struct XeroClient {
    http: reqwest::Client,
    auth: std::sync::Arc<XeroAuthClient>,
    payment_account: String,
}

impl XeroClient {
    pub fn new(auth: std::sync::Arc<XeroAuthClient>, payment_account: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
            payment_account: payment_account.into(),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Option<Value>, SyncError> {
        let credentials = self.auth.get_valid_credentials().await?;
        let response = self
            .http
            .get(format!("{BASE_URL}/{path}"))
            .bearer_auth(&credentials.access_token)
            .header("Xero-tenant-id", &credentials.tenant_id)
            .header("Accept", "application/json")
            .query(params)
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

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> Result<Value, SyncError> {
        let credentials = self.auth.get_valid_credentials().await?;
        let response = self
            .http
            .request(method, format!("{BASE_URL}/{path}"))
            .bearer_auth(&credentials.access_token)
            .header("Xero-tenant-id", &credentials.tenant_id)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Downstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LedgerApi for XeroClient {
    async fn find_item_by_code(&self, code: &str) -> Result<Option<LedgerItem>, SyncError> {
        let body = self
            .get("Items", &[("where", format!("Code==\"{code}\""))])
            .await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/Items/0"))
            .and_then(parse_item))
    }

    async fn create_item(&self, item: &NewLedgerItem) -> Result<LedgerItem, SyncError> {
        let payload = json!({
            "Items": [{
                "Code": item.code,
                "Name": item.name,
                "Description": item.description,
                "PurchaseDescription": item.purchase_description,
                "QuantityOnHand": item.quantity_on_hand,
                "IsTrackedAsInventory": true,
                "InventoryAssetAccountCode": item.inventory_asset_account,
                "PurchaseDetails": {
                    "UnitPrice": item.purchase_unit_price,
                    "COGSAccountCode": item.cogs_account,
                    "TaxType": "NONE",
                },
                "SalesDetails": {
                    "UnitPrice": item.sales_unit_price,
                    "AccountCode": item.sales_account,
                    "TaxType": "NONE",
                },
                "IsSold": true,
                "IsPurchased": true,
            }]
        });
        let body = self.send(reqwest::Method::POST, "Items", payload).await?;
        body.pointer("/Items/0")
            .and_then(parse_item)
            .ok_or_else(|| SyncError::Downstream {
                status: 200,
                body: "item create response had no Items".to_string(),
            })
    }

    async fn item_quantity(&self, item_id: &str) -> Result<f64, SyncError> {
        let body = self.get(&format!("Items/{item_id}"), &[]).await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/Items/0/QuantityOnHand"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0))
    }

    async fn find_invoice_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerInvoice>, SyncError> {
        let filter = format!("Type==\"ACCREC\" AND Reference==\"{reference}\"");
        let body = self.get("Invoices", &[("where", filter)]).await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/Invoices/0"))
            .and_then(parse_invoice))
    }

    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<LedgerInvoice, SyncError> {
        let payload = json!({
            "Invoices": [{
                "Type": "ACCREC",
                "Status": "AUTHORISED",
                "Date": invoice.date,
                "Reference": invoice.reference,
                "Contact": { "Name": invoice.contact_name },
                "LineItems": invoice.lines.iter().map(line_json).collect::<Vec<_>>(),
            }]
        });
        let body = self.send(reqwest::Method::POST, "Invoices", payload).await?;
        body.pointer("/Invoices/0")
            .and_then(parse_invoice)
            .ok_or_else(|| SyncError::Downstream {
                status: 200,
                body: "invoice create response had no Invoices".to_string(),
            })
    }

    async fn create_bill(&self, bill: &NewBill) -> Result<LedgerInvoice, SyncError> {
        let payload = json!({
            "Invoices": [{
                "Type": "ACCPAY",
                "Status": "AUTHORISED",
                "Date": bill.date,
                "Reference": bill.reference,
                "Contact": { "Name": BILL_CONTACT },
                "LineItems": [{
                    "ItemCode": bill.item_code,
                    "Description": format!("Stock adjustment {}", bill.item_code),
                    "Quantity": bill.quantity,
                    "UnitAmount": bill.unit_amount,
                    "TaxType": "NONE",
                }],
            }]
        });
        let body = self.send(reqwest::Method::POST, "Invoices", payload).await?;
        body.pointer("/Invoices/0")
            .and_then(parse_invoice)
            .ok_or_else(|| SyncError::Downstream {
                status: 200,
                body: "bill create response had no Invoices".to_string(),
            })
    }

    async fn void_invoice(&self, invoice_id: &str) -> Result<(), SyncError> {
        let payload = json!({
            "Invoices": [{ "InvoiceID": invoice_id, "Status": "VOIDED" }]
        });
        self.send(reqwest::Method::POST, "Invoices", payload).await?;
        Ok(())
    }

    async fn create_payment(&self, invoice_id: &str, amount: f64) -> Result<(), SyncError> {
        let payload = json!({
            "Payments": [{
                "Invoice": { "InvoiceID": invoice_id },
                "Account": { "Code": self.payment_account },
                "Date": today(),
                "Amount": amount,
            }]
        });
        self.send(reqwest::Method::PUT, "Payments", payload).await?;
        Ok(())
    }

    async fn create_credit_note(&self, note: &NewCreditNote) -> Result<(), SyncError> {
        let contact = match &note.contact_id {
            Some(id) => json!({ "ContactID": id }),
            None => json!({ "Name": note.contact_name.as_deref().unwrap_or("Shopify Customer") }),
        };
        let payload = json!({
            "CreditNotes": [{
                "Type": "ACCRECCREDIT",
                "Status": "AUTHORISED",
                "Date": note.date,
                "Reference": note.reference,
                "Contact": contact,
                "LineItems": note.lines.iter().map(line_json).collect::<Vec<_>>(),
            }]
        });
        let body = self
            .send(reqwest::Method::PUT, "CreditNotes", payload)
            .await?;

        // Allocate the full credit against the original invoice so the
        // two documents stay linked in the ledger.
        let note_id = body
            .pointer("/CreditNotes/0/CreditNoteID")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Downstream {
                status: 200,
                body: "credit note response had no CreditNoteID".to_string(),
            })?;
        let total: f64 = note
            .lines
            .iter()
            .map(|line| line.quantity * line.unit_amount)
            .sum();
        if total > 0.0 {
            let allocation = json!({
                "Allocations": [{
                    "Invoice": { "InvoiceID": note.invoice_id },
                    "Amount": total,
                    "Date": note.date,
                }]
            });
            self.send(
                reqwest::Method::PUT,
                &format!("CreditNotes/{note_id}/Allocations"),
                allocation,
            )
            .await?;
        }
        Ok(())
    }

    async fn contact_exists(&self, contact_id: &str) -> Result<bool, SyncError> {
        Ok(self
            .get(&format!("Contacts/{contact_id}"), &[])
            .await?
            .is_some())
    }
}

fn line_json(line: &crate::types::InvoiceLine) -> Value {
    json!({
        "Description": line.description,
        "Quantity": line.quantity,
        "UnitAmount": line.unit_amount,
        "AccountCode": line.account_code,
        "TaxType": "NONE",
    })
}

fn parse_item(value: &Value) -> Option<LedgerItem> {
    Some(LedgerItem {
        item_id: value.get("ItemID")?.as_str()?.to_string(),
        code: value
            .get("Code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        quantity_on_hand: value.get("QuantityOnHand").and_then(Value::as_f64),
    })
}

fn parse_invoice(value: &Value) -> Option<LedgerInvoice> {
    Some(LedgerInvoice {
        invoice_id: value.get("InvoiceID")?.as_str()?.to_string(),
        reference: value
            .get("Reference")
            .and_then(Value::as_str)
            .map(str::to_string),
        status: value
            .get("Status")
            .and_then(Value::as_str)
            .map(InvoiceStatus::parse)
            .unwrap_or(InvoiceStatus::Other),
        total: value.get("Total").and_then(Value::as_f64).unwrap_or(0.0),
        contact_id: value
            .pointer("/Contact/ContactID")
            .and_then(Value::as_str)
            .map(str::to_string),
        contact_name: value
            .pointer("/Contact/Name")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

pub(crate) fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
