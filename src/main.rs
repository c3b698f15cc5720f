use std::net::SocketAddr;
use std::sync::Arc;

use shopify_xero_sync::{
    app, AppState, EventRouter, InMemoryStore, InMemoryTokenStore, ShopifyClient, SyncConfig,
    SyncHandlers, SyncStore, XeroAuthClient, XeroClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = SyncConfig::from_env();

    let store: Arc<dyn SyncStore> = Arc::new(InMemoryStore::with_capacity(
        config.dedup_capacity,
        config.sync_log_capacity,
    ));
    let token_store = Arc::new(InMemoryTokenStore::new());
    let auth = Arc::new(XeroAuthClient::new(&config, token_store));
    let commerce = Arc::new(ShopifyClient::new(&config));
    let ledger = Arc::new(XeroClient::new(auth.clone(), config.payment_account.clone()));

    let handlers = SyncHandlers::new(
        config.clone(),
        store.clone(),
        commerce.clone(),
        ledger.clone(),
    );
    let pending_payments = handlers.pending_payments();
    let router = Arc::new(EventRouter::new(&config, store.clone(), handlers));

    shopify_xero_sync::spawn_compaction(store.clone(), config.compaction_interval);
    shopify_xero_sync::spawn_payment_sweep(
        pending_payments,
        ledger.clone(),
        config.payment_sweep_interval,
        config.payment_sweep_max_attempts,
        config.payment_sweep_jitter_ms,
    );

    // Best-effort: the service still receives deliveries for hooks that
    // already exist even if registration of new ones fails.
    let registration = commerce.clone();
    tokio::spawn(async move {
        if let Err(err) = registration.ensure_webhooks_registered().await {
            tracing::warn!(%err, "webhook registration failed");
        }
    });

    let state = AppState {
        router,
        store,
        auth,
        sync_log_capacity: config.sync_log_capacity,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
