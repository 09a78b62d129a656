//! Webhook 鉴权：伪造签名、未知供应商、签名头、重复投递

mod common;

use axum::body::Body;
use common::{TestEngine, WEBHOOK_SECRET, create_paid_order, eventually, seed_catalog};
use dropship_server::webhook::signature::{canonical_payload, sign};
use http::{Request, StatusCode};
use httpmock::prelude::*;
use serde_json::json;
use shared::models::DropshipStatus;
use tower::ServiceExt;

async fn confirmed_order(engine: &TestEngine, supplier_api: &MockServer) -> (common::Catalog, i64) {
    supplier_api
        .mock_async(|when, then| {
            when.method(POST).path("/v1/orders");
            then.status(201).json_body(json!({ "order_id": "ACME-5" }));
        })
        .await;
    let catalog = seed_catalog(engine.storage(), &supplier_api.url("/v1"), 1);
    let order = create_paid_order(engine.storage(), &catalog.products);
    let (_, body) = engine
        .request("POST", &format!("/api/orders/{}/decompose", order.id), None)
        .await;
    let dropship_id = body["data"]["dropship_orders"][0]["id"].as_i64().unwrap();

    let storage = engine.storage().clone();
    eventually("confirmation", || {
        storage
            .get_dropship_order(dropship_id)
            .unwrap()
            .is_some_and(|d| d.status == DropshipStatus::ConfirmedBySupplier)
    })
    .await;
    (catalog, dropship_id)
}

#[tokio::test]
async fn test_forged_signature_changes_nothing() {
    let supplier_api = MockServer::start_async().await;
    let engine = TestEngine::start().await;
    let (catalog, dropship_id) = confirmed_order(&engine, &supplier_api).await;
    let before = engine.storage().get_dropship_order(dropship_id).unwrap().unwrap();

    let (status, body) = engine
        .request(
            "POST",
            "/api/webhooks/suppliers",
            Some(json!({
                "event_type": "order.cancelled",
                "supplier_id": catalog.supplier.id,
                "order": { "dropship_order_id": dropship_id },
                "signature": "00ff"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(body["code"], 0);

    // unsigned is as bad as forged when a secret is configured
    let (status, _) = engine
        .request(
            "POST",
            "/api/webhooks/suppliers",
            Some(json!({
                "event_type": "order.cancelled",
                "supplier_id": catalog.supplier.id,
                "order": { "dropship_order_id": dropship_id }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let after = engine.storage().get_dropship_order(dropship_id).unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.notes.len(), before.notes.len());
    let integration = engine
        .storage()
        .get_integration(catalog.integration.id)
        .unwrap()
        .unwrap();
    assert_eq!(integration.consecutive_failures, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unknown_supplier_is_404() {
    let engine = TestEngine::start().await;
    let (status, _) = engine
        .send_webhook(json!({
            "event_type": "order.shipped",
            "supplier": "Nobody Ltd",
            "order": { "dropship_order_id": 1 }
        }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_signature_header_and_replay_guard() {
    let supplier_api = MockServer::start_async().await;
    let engine = TestEngine::start().await;
    let (catalog, dropship_id) = confirmed_order(&engine, &supplier_api).await;

    let envelope = json!({
        "event_id": "evt-42",
        "event_type": "order.shipped",
        "supplier": catalog.supplier.name,
        "order": { "dropship_order_id": dropship_id, "tracking_number": "TRK-1" }
    });
    let signature = sign(WEBHOOK_SECRET, &canonical_payload(&envelope));
    let send = || {
        Request::builder()
            .method("POST")
            .uri("/api/webhooks/suppliers")
            .header("content-type", "application/json")
            .header("x-dropship-signature", signature.clone())
            .body(Body::from(serde_json::to_vec(&envelope).unwrap()))
            .unwrap()
    };

    let response = engine.app.clone().oneshot(send()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let storage = engine.storage().clone();
    eventually("shipment", || {
        storage
            .get_dropship_order(dropship_id)
            .unwrap()
            .is_some_and(|d| d.status == DropshipStatus::ShippedBySupplier)
    })
    .await;
    let shipped = storage.get_dropship_order(dropship_id).unwrap().unwrap();

    // same event id again: accepted, not re-applied
    let response = engine.app.clone().oneshot(send()).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let replayed = storage.get_dropship_order(dropship_id).unwrap().unwrap();
    assert_eq!(replayed.notes.len(), shipped.notes.len());
    assert_eq!(replayed.tracking_number.as_deref(), Some("TRK-1"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_event_is_rejected() {
    let supplier_api = MockServer::start_async().await;
    let engine = TestEngine::start().await;
    let catalog = seed_catalog(engine.storage(), &supplier_api.url("/v1"), 1);

    let (status, _) = engine
        .send_webhook(json!({
            "event_type": "invoice.paid",
            "supplier_id": catalog.supplier.id
        }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    engine.shutdown().await;
}
