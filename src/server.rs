use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::router::{EventRouter, InboundEvent, RouterResponse};
use crate::store::SyncStore;
use crate::token::XeroAuthClient;

const TOPIC_HEADER: &str = "X-Shopify-Topic";
const SIGNATURE_HEADER: &str = "X-Shopify-Hmac-Sha256";

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub store: Arc<dyn SyncStore>,
    pub auth: Arc<XeroAuthClient>,
    pub sync_log_capacity: usize,
}

/// The full inbound surface: webhook intake, status page, OAuth
/// bootstrap.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/webhook/inventory", post(receive_webhook))
        .route("/webhook/inventory/orders", post(receive_webhook))
        .route("/xero/redirect", get(xero_redirect))
        .route("/xero/callback", get(xero_callback))
        .with_state(state)
}

/// Webhook intake. The body must stay raw bytes until the signature
/// over them has been verified.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let topic = headers.get(TOPIC_HEADER).and_then(|v| v.to_str().ok());
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let response = state
        .router
        .handle(InboundEvent {
            topic,
            signature,
            body: &body,
        })
        .await;

    match response {
        RouterResponse::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        RouterResponse::Accepted(outcome) => (StatusCode::OK, outcome.as_str().to_string()),
        RouterResponse::Failed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Error".to_string()),
    }
}

/// Minimal status page: connect link plus the recent inventory events.
async fn home(State(state): State<AppState>) -> Html<String> {
    let entries = state.store.recent_sync_log(state.sync_log_capacity).await;

    let mut html = String::from(
        "<h1>Connect to Xero</h1>\
         <a href=\"/xero/redirect\"><button>Connect to Xero</button></a>\
         <hr/><h1>Shopify Inventory Updates</h1>",
    );
    if entries.is_empty() {
        html.push_str("<p>No updates yet.</p>");
    } else {
        html.push_str("<ul>");
        for (index, entry) in entries.iter().enumerate() {
            html.push_str(&format!(
                "<li><strong>{}:</strong> Inventory Item ID: {}, Available: {}, Updated At: {}</li>",
                index + 1,
                entry.inventory_item_id,
                entry.available,
                html_escape(&entry.updated_at),
            ));
        }
        html.push_str("</ul>");
    }
    Html(html)
}

async fn xero_redirect(State(state): State<AppState>) -> Redirect {
    let oauth_state = format!("{:016x}", fastrand::u64(..));
    Redirect::temporary(&state.auth.authorize_url(&oauth_state))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

async fn xero_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let Some(code) = params.code else {
        return Html(
            "<p>Missing authorization code.</p><a href=\"/\">Back</a>".to_string(),
        );
    };

    match state.auth.exchange_code(&code).await {
        Ok(token) => {
            tracing::info!(tenant_id = %token.tenant_id, "connected to ledger");
            Html(format!(
                "<h1>Connected to Xero</h1>\
                 <p><strong>Tenant ID:</strong> {}</p>\
                 <a href=\"/\">Back to Home</a>",
                html_escape(&token.tenant_id)
            ))
        }
        Err(err) => {
            tracing::error!(%err, "OAuth exchange failed");
            Html(
                "<p>Something went wrong connecting to Xero.</p><a href=\"/\">Back</a>"
                    .to_string(),
            )
        }
    }
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
