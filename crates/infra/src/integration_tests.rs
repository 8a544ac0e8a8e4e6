//! End-to-end tests for the full ingestion + projection path.
//!
//! Events enter as raw JSON (exactly as a producer would send them), run
//! through the pipeline into the in-memory fact store, and are read back
//! through the projector and the latest-state views.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use uprl_core::{ErrorKind, OrderId};

use crate::fact_store::{DlqFilter, FactStore, InMemoryFactStore, VersionRange};
use crate::pipeline::{IngestOutcome, IngestionPipeline};
use crate::projections::{LatestStateViews, PayablesProjector};

struct Harness {
    store: Arc<InMemoryFactStore>,
    pipeline: IngestionPipeline,
    views: LatestStateViews,
    projector: PayablesProjector,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryFactStore::new());
    let dyn_store: Arc<dyn FactStore> = store.clone();
    Harness {
        store,
        pipeline: IngestionPipeline::new(dyn_store.clone()),
        views: LatestStateViews::new(dyn_store.clone()),
        projector: PayablesProjector::new(dyn_store),
    }
}

async fn ingest_committed(h: &Harness, event: JsonValue) -> i64 {
    match h.pipeline.ingest(event).await.unwrap() {
        IngestOutcome::Committed { version, .. } => version,
        other => panic!("expected Committed, got {other:?}"),
    }
}

fn pricing_event_s1(order_id: &str) -> JsonValue {
    json!({
        "event_id": format!("evt-pricing-{order_id}-1"),
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": order_id,
        "emitted_at": "2026-07-01T10:00:00Z",
        "emitter_service": "vertical-service",
        "components": [
            {"component_type": "RoomRate", "amount": 500000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001", "room_night": "N1"}},
            {"component_type": "RoomRate", "amount": 500000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001", "room_night": "N2"}},
            {"component_type": "Tax", "amount": 110000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001"}},
            {"component_type": "Markup", "amount": 50000, "currency": "IDR",
             "dimensions": {}}
        ],
        "totals": {"customer_total": 1160000, "currency": "IDR"}
    })
}

fn supplier_event(
    event_id: &str,
    order_id: &str,
    detail: &str,
    status: &str,
    amount_due: i64,
    fulfillment: Option<&str>,
    parties: Option<JsonValue>,
    cancellation: Option<JsonValue>,
) -> JsonValue {
    let mut supplier = json!({
        "status": status,
        "supplier_id": "AGODA",
        "supplier_ref": "AG-REF-001",
        "amount_due": amount_due,
        "amount_basis": "gross",
        "currency": "IDR"
    });
    if let Some(fulfillment) = fulfillment {
        supplier["fulfillment_instance_id"] = json!(fulfillment);
    }
    if let Some(cancellation) = cancellation {
        supplier["cancellation"] = cancellation;
    }

    let mut event = json!({
        "event_id": event_id,
        "event_type": "SupplierLifecycleEvent",
        "schema_version": "supplier.timeline.v2",
        "order_id": order_id,
        "order_detail_id": detail,
        "emitted_at": "2026-07-01T11:00:00Z",
        "supplier": supplier
    });
    if let Some(parties) = parties {
        event["parties"] = parties;
    }
    event
}

// ── S1: simple hotel booking ────────────────────────────────────────────────

#[tokio::test]
async fn s1_simple_hotel_booking() {
    let h = harness();
    let version = ingest_committed(&h, pricing_event_s1("ORD-9001")).await;
    assert_eq!(version, 1);

    let rows = h
        .store
        .pricing_components(&OrderId::new("ORD-9001"), VersionRange::all())
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.version == 1));

    let order = h.views.get_order(&OrderId::new("ORD-9001")).await.unwrap();
    assert_eq!(order.pricing_latest.len(), 4);
    let sum: i64 = order.pricing_latest.iter().map(|r| r.amount).sum();
    assert_eq!(sum, 1_160_000);
}

// ── S2: out-of-order versions ───────────────────────────────────────────────

#[tokio::test]
async fn s2_out_of_order_versions() {
    let h = harness();

    let v3 = json!({
        "event_id": "evt-pricing-v3",
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-9002",
        "emitted_at": "2026-07-01T12:00:00Z",
        "version": 3,
        "components": [
            {"component_type": "RoomRate", "amount": 550000, "currency": "IDR",
             "dimensions": {"order_detail_id": "OD-001"}}
        ]
    });
    let mut v2 = v3.clone();
    v2["event_id"] = json!("evt-pricing-v2");
    v2["version"] = json!(2);
    v2["components"][0]["amount"] = json!(520000);

    assert_eq!(ingest_committed(&h, v3).await, 3);
    assert_eq!(ingest_committed(&h, v2).await, 2);

    let rows = h
        .store
        .pricing_components(&OrderId::new("ORD-9002"), VersionRange::all())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let order = h.views.get_order(&OrderId::new("ORD-9002")).await.unwrap();
    assert_eq!(order.pricing_latest.len(), 1);
    assert_eq!(order.pricing_latest[0].version, 3);
    assert_eq!(order.pricing_latest[0].amount, 550000);
}

// ── S3: multi-instance passes ───────────────────────────────────────────────

#[tokio::test]
async fn s3_multi_instance_passes() {
    let h = harness();
    let order = "ORD-1322884534";
    let detail = "OD-1359185528";

    ingest_committed(
        &h,
        supplier_event("evt-booking", order, detail, "Confirmed", 0, None, None, None),
    )
    .await;
    for (idx, ticket) in [
        "ticket_code_1757809185001",
        "ticket_code_1757809307001",
        "ticket_code_1757772769001",
    ]
    .iter()
    .enumerate()
    {
        ingest_committed(
            &h,
            supplier_event(
                &format!("evt-redemption-{idx}"),
                order,
                detail,
                "ISSUED",
                127500,
                Some(ticket),
                None,
                None,
            ),
        )
        .await;
    }

    let payables = h
        .projector
        .effective_payables(&OrderId::new(order))
        .await
        .unwrap();
    assert_eq!(payables.len(), 4);

    let booking = payables
        .iter()
        .find(|p| p.fulfillment_instance_id.is_none())
        .unwrap();
    assert_eq!(booking.total, 0);

    let redemption_totals: Vec<i64> = payables
        .iter()
        .filter(|p| p.fulfillment_instance_id.is_some())
        .map(|p| p.total)
        .collect();
    assert_eq!(redemption_totals, vec![127500, 127500, 127500]);

    let sum: i64 = payables.iter().map(|p| p.total).sum();
    assert_eq!(sum, 382_500);
}

// ── S4: projection carry-forward ────────────────────────────────────────────

async fn run_s4(h: &Harness) {
    ingest_committed(
        h,
        supplier_event(
            "evt-s4-v1",
            "ORD-S4",
            "OD-002",
            "ISSUED",
            300000,
            None,
            Some(json!([{
                "party_type": "AFFILIATE",
                "party_id": "100005361",
                "party_name": "Partner CFD",
                "lines": [
                    {"obligation_type": "AFFILIATE_COMMISSION", "amount": 4694,
                     "amount_effect": "INCREASES_PAYABLE", "currency": "IDR"},
                    {"obligation_type": "COMMISSION_VAT", "amount": 516,
                     "amount_effect": "INCREASES_PAYABLE", "currency": "IDR"}
                ]
            }])),
            None,
        ),
    )
    .await;

    ingest_committed(
        h,
        supplier_event(
            "evt-s4-v2",
            "ORD-S4",
            "OD-002",
            "CancelledWithFee",
            300000,
            None,
            Some(json!([])),
            Some(json!({"fee_amount": 50000, "currency": "IDR"})),
        ),
    )
    .await;
}

#[tokio::test]
async fn s4_projection_carries_prior_obligations_forward() {
    let h = harness();
    run_s4(&h).await;

    let payables = h
        .projector
        .effective_payables(&OrderId::new("ORD-S4"))
        .await
        .unwrap();
    assert_eq!(payables.len(), 1);
    let instance = &payables[0];

    assert_eq!(instance.status, "CancelledWithFee");
    assert_eq!(instance.baseline, 0);
    assert_eq!(instance.obligations.len(), 3);
    assert_eq!(instance.total, 4694 + 516 + 50000);
    assert_eq!(instance.total, 55_210);
}

// ── S5: partner adjustment persists ─────────────────────────────────────────

#[tokio::test]
async fn s5_partner_adjustment_persists() {
    let h = harness();
    run_s4(&h).await;

    let adjustment = json!({
        "event_id": "evt-s5-penalty",
        "event_type": "PartnerAdjustmentEvent",
        "schema_version": "partner.adjustment.v1",
        "order_id": "ORD-S4",
        "emitted_at": "2026-07-01T13:00:00Z",
        "order_detail_id": "OD-002",
        "supplier_reference_id": "AG-REF-001",
        "party_type": "AFFILIATE",
        "party_id": "100005361",
        "party_name": "Partner CFD",
        "obligation_type": "AFFILIATE_PENALTY",
        "amount": 500000,
        "amount_effect": "INCREASES_PAYABLE",
        "currency": "IDR"
    });
    let version = ingest_committed(&h, adjustment).await;
    assert_eq!(version, -1);

    let payables = h
        .projector
        .effective_payables(&OrderId::new("ORD-S4"))
        .await
        .unwrap();
    assert_eq!(payables[0].total, 555_210);
}

// ── S6: refund lineage ──────────────────────────────────────────────────────

#[tokio::test]
async fn s6_refund_lineage() {
    let h = harness();
    ingest_committed(&h, pricing_event_s1("ORD-9001")).await;

    let refund = json!({
        "event_id": "evt-refund-1",
        "event_type": "refund.issued",
        "schema_version": "refund.components.v1",
        "order_id": "ORD-9001",
        "emitted_at": "2026-07-02T09:00:00Z",
        "refund_id": "RFD-001",
        "components": [{
            "component_type": "RoomRate",
            "amount": -500000,
            "currency": "IDR",
            "dimensions": {"order_detail_id": "OD-001", "room_night": "N2"},
            "refund_of_component_semantic_id":
                "cs-ORD-9001-order_detail_id-OD-001-room_night-N2-RoomRate"
        }]
    });
    let version = ingest_committed(&h, refund).await;
    assert_eq!(version, 2);

    let rows = h
        .store
        .pricing_components(&OrderId::new("ORD-9001"), VersionRange::all())
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);

    let refund_row = rows.iter().find(|r| r.is_refund).unwrap();
    assert!(refund_row.amount < 0);
    assert_eq!(
        refund_row.refund_of_component_semantic_id.as_deref(),
        Some("cs-ORD-9001-order_detail_id-OD-001-room_night-N2-RoomRate")
    );
    // Refund semantic ids carry the refund id: lineage without collision.
    assert!(refund_row.component_semantic_id.contains("RFD-001"));

    let sum: i64 = rows.iter().map(|r| r.amount).sum();
    assert_eq!(sum, 660_000);

    let lineage = h
        .store
        .component_lineage("cs-ORD-9001-order_detail_id-OD-001-room_night-N2-RoomRate")
        .await
        .unwrap();
    assert_eq!(lineage.original.len(), 1);
    assert_eq!(lineage.refunds.len(), 1);
}

// ── Idempotency & failure dispositions ──────────────────────────────────────

#[tokio::test]
async fn replaying_an_event_does_not_change_the_store() {
    let h = harness();
    ingest_committed(&h, pricing_event_s1("ORD-9001")).await;

    let outcome = h.pipeline.ingest(pricing_event_s1("ORD-9001")).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));

    let rows = h
        .store
        .pricing_components(&OrderId::new("ORD-9001"), VersionRange::all())
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn empty_components_event_is_dead_lettered() {
    let h = harness();
    let event = json!({
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-EMPTY",
        "emitted_at": "2026-07-01T10:00:00Z",
        "components": []
    });

    let outcome = h.pipeline.ingest(event).await.unwrap();
    let IngestOutcome::DeadLettered { error_kind, .. } = outcome else {
        panic!("expected DeadLettered, got {outcome:?}");
    };
    assert_eq!(error_kind, ErrorKind::Validation);

    let entries = h
        .store
        .list_dlq(DlqFilter {
            order_id: Some(OrderId::new("ORD-EMPTY")),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    // Raw payload is preserved verbatim for replay.
    assert_eq!(entries[0].raw_event["order_id"], json!("ORD-EMPTY"));
}

#[tokio::test]
async fn unknown_event_type_is_dead_lettered() {
    let h = harness();
    let event = json!({
        "event_type": "InventoryAdjusted",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-1",
        "emitted_at": "2026-07-01T10:00:00Z"
    });

    let outcome = h.pipeline.ingest(event).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::DeadLettered {
            error_kind: ErrorKind::Validation,
            ..
        }
    ));
}

#[tokio::test]
async fn non_scalar_dimension_is_dead_lettered_as_identity_error() {
    let h = harness();
    let event = json!({
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-BADDIM",
        "emitted_at": "2026-07-01T10:00:00Z",
        "components": [{
            "component_type": "RoomRate",
            "amount": 100,
            "currency": "IDR",
            "dimensions": {"nested": {"a": 1}}
        }]
    });

    let outcome = h.pipeline.ingest(event).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::DeadLettered {
            error_kind: ErrorKind::Identity,
            ..
        }
    ));
}

#[tokio::test]
async fn totals_mismatch_warns_but_commits() {
    let h = harness();
    let event = json!({
        "event_id": "evt-mismatch",
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-MISMATCH",
        "emitted_at": "2026-07-01T10:00:00Z",
        "components": [
            {"component_type": "RoomRate", "amount": 500000, "currency": "IDR"}
        ],
        "totals": {"customer_total": 999999, "currency": "IDR"}
    });

    let outcome = h.pipeline.ingest(event).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Committed { .. }));
}

#[tokio::test]
async fn duplicate_pinned_pricing_version_is_dead_lettered() {
    let h = harness();
    ingest_committed(&h, pricing_event_s1("ORD-9001")).await;

    let event = json!({
        "event_id": "evt-dup-version",
        "event_type": "PricingUpdated",
        "schema_version": "pricing.commerce.v1",
        "order_id": "ORD-9001",
        "emitted_at": "2026-07-01T10:05:00Z",
        "version": 1,
        "components": [
            {"component_type": "RoomRate", "amount": 1, "currency": "IDR"}
        ]
    });

    let outcome = h.pipeline.ingest(event).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::DeadLettered {
            error_kind: ErrorKind::Validation,
            ..
        }
    ));
}

// ── Versioning across families ──────────────────────────────────────────────

#[tokio::test]
async fn families_version_independently_for_one_order() {
    let h = harness();
    ingest_committed(&h, pricing_event_s1("ORD-MIX")).await;

    let payment = json!({
        "event_id": "evt-payment-1",
        "event_type": "PaymentLifecycle",
        "schema_version": "payment.timeline.v1",
        "order_id": "ORD-MIX",
        "emitted_at": "2026-07-01T10:30:00Z",
        "payment": {
            "status": "Captured",
            "payment_method": {"channel": "CC", "provider": "Stripe", "brand": "VISA"},
            "currency": "IDR",
            "captured_amount": 1160000,
            "captured_amount_total": 1160000
        }
    });
    assert_eq!(ingest_committed(&h, payment).await, 1);

    let refund_lifecycle = json!({
        "event_id": "evt-rfd-lc-1",
        "event_type": "RefundLifecycle",
        "schema_version": "refund.lifecycle.v1",
        "order_id": "ORD-MIX",
        "emitted_at": "2026-07-02T08:00:00Z",
        "refund_id": "RFD-001",
        "status": "INITIATED",
        "refund_amount": 500000,
        "currency": "IDR"
    });
    assert_eq!(ingest_committed(&h, refund_lifecycle).await, 1);

    // Same refund, next lifecycle step: its own family counter advances.
    let closed = json!({
        "event_id": "evt-rfd-lc-2",
        "event_type": "RefundLifecycle",
        "schema_version": "refund.lifecycle.v1",
        "order_id": "ORD-MIX",
        "emitted_at": "2026-07-03T08:00:00Z",
        "refund_id": "RFD-001",
        "status": "CLOSED",
        "refund_amount": 500000,
        "currency": "IDR"
    });
    assert_eq!(ingest_committed(&h, closed).await, 2);

    let order = h.views.get_order(&OrderId::new("ORD-MIX")).await.unwrap();
    assert_eq!(order.pricing_latest.len(), 4);
    assert_eq!(
        order.payment_latest.as_ref().map(|p| p.timeline_version),
        Some(1)
    );
    assert_eq!(order.refund_latest.len(), 1);
    assert_eq!(order.refund_latest[0].status, "CLOSED");
}

#[tokio::test]
async fn pricing_history_rolls_up_versions() {
    let h = harness();
    ingest_committed(&h, pricing_event_s1("ORD-HIST")).await;

    let mut second = pricing_event_s1("ORD-HIST");
    second["event_id"] = json!("evt-pricing-ORD-HIST-2");
    ingest_committed(&h, second).await;

    let history = h
        .views
        .pricing_history(&OrderId::new("ORD-HIST"), VersionRange::all())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 2);
    assert_eq!(history[0].component_count, 4);
    assert_eq!(history[0].total_amount, 1_160_000);
}
