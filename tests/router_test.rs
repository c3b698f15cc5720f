mod common;

use std::time::Duration;

use common::{build_router, test_config, TEST_SECRET};
use shopify_xero_sync::{
    compute_signature, HandlerOutcome, InboundEvent, InvoiceStatus, RouterResponse, SyncConfig,
    SyncStore,
};

fn signed_event<'a>(topic: &'a str, body: &'a [u8], signature: &'a str) -> InboundEvent<'a> {
    InboundEvent {
        topic: Some(topic),
        signature: Some(signature),
        body,
    }
}

fn order_body(name: &str, created_at: &str) -> Vec<u8> {
    serde_json::json!({
        "id": 450789,
        "name": name,
        "created_at": created_at,
        "customer": { "first_name": "Jane", "last_name": "Doe" },
        "line_items": [
            { "title": "Sencha 100g", "quantity": 2, "price": "12.50", "total_discount": "0.00" }
        ],
        "shipping_lines": []
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn bad_signature_rejected_before_any_side_effect() {
    let harness = build_router(test_config());

    let body = order_body("#1001", "T1");
    let response = harness
        .router
        .handle(signed_event("orders/paid", &body, "AAAA invalid AAAA"))
        .await;

    assert!(matches!(response, RouterResponse::Unauthorized));
    assert_eq!(harness.commerce.call_count().await, 0);
    assert_eq!(harness.ledger.call_count().await, 0);
}

#[tokio::test]
async fn missing_signature_rejected() {
    let harness = build_router(test_config());
    let body = order_body("#1001", "T1");

    let response = harness
        .router
        .handle(InboundEvent {
            topic: Some("orders/paid"),
            signature: None,
            body: &body,
        })
        .await;

    assert!(matches!(response, RouterResponse::Unauthorized));
    assert_eq!(harness.ledger.call_count().await, 0);
}

#[tokio::test]
async fn duplicate_delivery_is_suppressed() {
    let harness = build_router(test_config());
    let body = order_body("#1001", "2024-05-01T10:00:00Z");
    let signature = compute_signature(TEST_SECRET.as_bytes(), &body);

    let first = harness
        .router
        .handle(signed_event("orders/paid", &body, &signature))
        .await;
    assert!(matches!(
        first,
        RouterResponse::Accepted(HandlerOutcome::Synced)
    ));

    let second = harness
        .router
        .handle(signed_event("orders/paid", &body, &signature))
        .await;
    assert!(matches!(
        second,
        RouterResponse::Accepted(HandlerOutcome::Duplicate)
    ));

    // Exactly one invoice despite two deliveries.
    assert_eq!(harness.ledger.invoices.lock().await.len(), 1);
}

#[tokio::test]
async fn redelivery_after_ttl_is_processed_independently() {
    let config = SyncConfig {
        dedup_ttl: Duration::from_millis(30),
        ..test_config()
    };
    let harness = build_router(config);
    let body = order_body("#1001", "2024-05-01T10:00:00Z");
    let signature = compute_signature(TEST_SECRET.as_bytes(), &body);

    let first = harness
        .router
        .handle(signed_event("orders/paid", &body, &signature))
        .await;
    assert!(matches!(
        first,
        RouterResponse::Accepted(HandlerOutcome::Synced)
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;

    // Past the window this is a fresh event; the handler's own
    // reference lookup is what prevents a second invoice.
    let second = harness
        .router
        .handle(signed_event("orders/paid", &body, &signature))
        .await;
    assert!(matches!(
        second,
        RouterResponse::Accepted(HandlerOutcome::Skipped { .. })
    ));
    assert_eq!(harness.ledger.invoices.lock().await.len(), 1);
}

#[tokio::test]
async fn unhandled_topic_is_acknowledged() {
    let harness = build_router(test_config());
    let body = br#"{"id": 1}"#;
    let signature = compute_signature(TEST_SECRET.as_bytes(), body);

    let response = harness
        .router
        .handle(signed_event("products/update", body, &signature))
        .await;

    assert!(matches!(
        response,
        RouterResponse::Accepted(HandlerOutcome::Received)
    ));
    assert_eq!(harness.ledger.call_count().await, 0);
}

#[tokio::test]
async fn malformed_payload_fails_after_verification() {
    let harness = build_router(test_config());
    let body = b"not json at all";
    let signature = compute_signature(TEST_SECRET.as_bytes(), body);

    let response = harness
        .router
        .handle(signed_event("orders/paid", body, &signature))
        .await;

    assert!(matches!(response, RouterResponse::Failed(_)));
    assert_eq!(harness.ledger.call_count().await, 0);
}

#[tokio::test]
async fn cancellation_voids_once_end_to_end() {
    let harness = build_router(test_config());
    let invoice_id = harness
        .ledger
        .seed_invoice("#1001", InvoiceStatus::Authorised, 25.0, None)
        .await;

    let body = serde_json::json!({
        "id": 450789,
        "name": "#1001",
        "created_at": "2024-05-01T10:00:00Z"
    })
    .to_string()
    .into_bytes();
    let signature = compute_signature(TEST_SECRET.as_bytes(), &body);

    let first = harness
        .router
        .handle(signed_event("orders/cancelled", &body, &signature))
        .await;
    assert!(matches!(
        first,
        RouterResponse::Accepted(HandlerOutcome::Synced)
    ));
    assert_eq!(
        harness.ledger.invoice_status(&invoice_id).await,
        Some(InvoiceStatus::Voided)
    );

    // Identical redelivery: suppressed, no second void call.
    let second = harness
        .router
        .handle(signed_event("orders/cancelled", &body, &signature))
        .await;
    assert!(matches!(
        second,
        RouterResponse::Accepted(HandlerOutcome::Duplicate)
    ));
    assert_eq!(harness.ledger.voided.lock().await.len(), 1);

    // A later cancellation of the same order (new delivery, new key)
    // finds the invoice already voided and no-ops.
    let late_body = serde_json::json!({
        "id": 450789,
        "name": "#1001",
        "created_at": "2024-05-01T10:05:00Z"
    })
    .to_string()
    .into_bytes();
    let late_signature = compute_signature(TEST_SECRET.as_bytes(), &late_body);
    let third = harness
        .router
        .handle(signed_event("orders/cancelled", &late_body, &late_signature))
        .await;
    assert!(matches!(
        third,
        RouterResponse::Accepted(HandlerOutcome::Skipped { .. })
    ));
    assert_eq!(harness.ledger.voided.lock().await.len(), 1);
}

#[tokio::test]
async fn inventory_event_lands_in_status_log() {
    let harness = build_router(test_config());
    harness.commerce.add_variant(123, Some("ABC"), 10.0).await;

    let body = serde_json::json!({
        "inventory_item_id": 123,
        "location_id": 1,
        "available": 5,
        "updated_at": "2024-05-01T10:00:00Z"
    })
    .to_string()
    .into_bytes();
    let signature = compute_signature(TEST_SECRET.as_bytes(), &body);

    let response = harness
        .router
        .handle(signed_event("inventory_levels/update", &body, &signature))
        .await;
    assert!(matches!(response, RouterResponse::Accepted(_)));

    let log = harness.handlers_store.recent_sync_log(10).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].inventory_item_id, 123);
    assert_eq!(log[0].available, 5);
}
