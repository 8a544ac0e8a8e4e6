//! Black-box tests against the running HTTP service.
//!
//! Spawns the real app (in-memory fact store) on an ephemeral port and
//! drives it with plain HTTP, exactly as a producer/consumer pair would.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

use uprl_api::app::{build_app, AppServices};
use uprl_infra::InMemoryFactStore;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryFactStore::new());
        let services = Arc::new(AppServices::new(store));
        let app = build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn pricing_event() -> JsonValue {
    json!({
        "event_id": "evt-api-pricing-1",
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-API-1",
        "emitted_at": "2026-07-01T10:00:00Z",
        "components": [
            {"component_type": "RoomRate", "amount": 500000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001"}},
            {"component_type": "Tax", "amount": 55000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001"}}
        ],
        "totals": {"customer_total": 555000, "currency": "IDR"}
    })
}

fn supplier_event() -> JsonValue {
    json!({
        "event_id": "evt-api-supplier-1",
        "event_type": "IssuanceSupplierLifecycle",
        "schema_version": "supplier.timeline.v2",
        "order_id": "ORD-API-1",
        "order_detail_id": "OD-001",
        "emitted_at": "2026-07-01T11:00:00Z",
        "supplier": {
            "status": "ISSUED",
            "supplier_id": "AGODA",
            "supplier_ref": "AG-REF-API",
            "amount_due": 450000,
            "amount_basis": "gross",
            "currency": "IDR"
        },
        "parties": [{
            "party_type": "AFFILIATE",
            "party_id": "100005361",
            "lines": [{
                "obligation_type": "AFFILIATE_COMMISSION",
                "amount": 4694,
                "amount_effect": "INCREASES_PAYABLE",
                "currency": "IDR"
            }]
        }]
    })
}

#[tokio::test]
async fn ingest_then_read_order_and_payables() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/events", server.base_url))
        .json(&pricing_event())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["status"], "committed");
    assert_eq!(body["version"], 1);

    let res = client
        .post(format!("{}/events", server.base_url))
        .json(&supplier_event())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let order: JsonValue = client
        .get(format!("{}/orders/ORD-API-1", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(order["pricing_latest"].as_array().unwrap().len(), 2);
    assert_eq!(order["supplier_latest"].as_array().unwrap().len(), 1);

    let payables: JsonValue = client
        .get(format!("{}/orders/ORD-API-1/payables", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let instances = payables.as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["baseline"], 450000);
    assert_eq!(instances[0]["total"], 454694);

    let orders: JsonValue = client
        .get(format!("{}/orders", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders, json!(["ORD-API-1"]));
}

#[tokio::test]
async fn duplicate_delivery_reports_duplicate() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for expected in ["committed", "duplicate"] {
        let res = client
            .post(format!("{}/events", server.base_url))
            .json(&pricing_event())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body: JsonValue = res.json().await.unwrap();
        assert_eq!(body["status"], expected);
    }
}

#[tokio::test]
async fn malformed_event_lands_in_dlq() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/events", server.base_url))
        .json(&json!({
            "event_type": "PricingUpdated",
            "schema_version": "pricing.commerce.v1",
            "order_id": "ORD-BAD",
            "emitted_at": "2026-07-01T10:00:00Z",
            "components": []
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["status"], "dead_lettered");
    assert_eq!(body["error_kind"], "VALIDATION");

    let dlq: JsonValue = client
        .get(format!(
            "{}/dlq?error_kind=VALIDATION&order_id=ORD-BAD",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dlq.as_array().unwrap().len(), 1);

    let res = client
        .get(format!("{}/dlq?error_kind=bogus", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_is_404() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/orders/ORD-NOPE", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refund_lineage_is_readable() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/events", server.base_url))
        .json(&pricing_event())
        .send()
        .await
        .unwrap();

    let refund = json!({
        "event_id": "evt-api-refund-1",
        "event_type": "refund.issued",
        "schema_version": "refund.components.v1",
        "order_id": "ORD-API-1",
        "emitted_at": "2026-07-02T09:00:00Z",
        "refund_id": "RFD-001",
        "components": [{
            "component_type": "RoomRate",
            "amount": -500000,
            "currency": "IDR",
            "dimensions": {"order_detail_id": "OD-001"},
            "refund_of_component_semantic_id":
                "cs-ORD-API-1-order_detail_id-OD-001-RoomRate"
        }]
    });
    let res = client
        .post(format!("{}/events", server.base_url))
        .json(&refund)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let lineage: JsonValue = client
        .get(format!(
            "{}/components/cs-ORD-API-1-order_detail_id-OD-001-RoomRate/lineage",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(lineage["original"].as_array().unwrap().len(), 1);
    assert_eq!(lineage["refunds"].as_array().unwrap().len(), 1);
    assert_eq!(lineage["refunds"][0]["amount"], -500000);
}
