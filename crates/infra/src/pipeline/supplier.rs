//! SupplierLifecycle handler.
//!
//! Persists the timeline row plus one payable line per party × line, all
//! carrying the event's version. Under `CancelledWithFee`, a `cancellation`
//! payload is normalized into a `CANCELLATION_FEE` obligation line at the
//! same version so the fee flows through party projection like any other
//! obligation (the baseline for cancelled instances is always zero).

use chrono::Utc;
use uuid::Uuid;

use uprl_core::{
    AmountEffect, FulfillmentKey, PartyType, SupplierPayableLine, SupplierStatus,
    SupplierTimelineFact, VersionFamily, VersionScope,
};
use uprl_events::{EventEnvelope, SupplierLifecycleBody};

use crate::fact_store::FactBatch;

use super::{IngestError, IngestOutcome, IngestionPipeline};

pub(super) const CANCELLATION_FEE: &str = "CANCELLATION_FEE";

pub(super) async fn handle(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = SupplierLifecycleBody::from_envelope(env)?;
    let supplier_reference_id = body.supplier_reference_id();
    let supplier = &body.supplier;

    let fulfillment =
        FulfillmentKey::from_option(supplier.fulfillment_instance_id.as_deref());

    let scope = VersionScope::Supplier {
        order_id: env.order_id.clone(),
        order_detail_id: body.order_detail_id.clone(),
        supplier_reference_id: supplier_reference_id.clone(),
        fulfillment: fulfillment.clone(),
    };

    let _guard = pipeline.locks.acquire(&env.order_id).await;
    let version = pipeline.registry.next(&scope).await?;
    let ingested_at = Utc::now();

    let fx_context = supplier
        .fx_context
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| IngestError::Validation(format!("fx_context serialization: {e}")))?;

    let timeline = SupplierTimelineFact {
        event_id: event_id.to_string(),
        order_id: env.order_id.clone(),
        order_detail_id: body.order_detail_id.clone(),
        supplier_id: supplier.supplier_id.clone(),
        supplier_reference_id: supplier_reference_id.clone(),
        booking_code: supplier.booking_code.clone(),
        fulfillment_instance_id: supplier.fulfillment_instance_id.clone(),
        supplier_timeline_version: version,
        status: supplier.status.as_str().to_string(),
        amount: supplier.amount_due,
        amount_basis: supplier.amount_basis.map(|b| b.as_str().to_string()),
        currency: supplier.currency.clone(),
        fx_context,
        entity_context: supplier.entity_context.clone(),
        emitter_service: env.emitter_service.clone(),
        emitted_at: env.emitted_at,
        ingested_at,
        metadata: env.meta.clone(),
    };

    let mut lines = Vec::new();
    for party in body.parties.iter().flatten() {
        for line in &party.lines {
            lines.push(SupplierPayableLine {
                line_id: Uuid::now_v7().to_string(),
                event_id: event_id.to_string(),
                order_id: env.order_id.clone(),
                order_detail_id: body.order_detail_id.clone(),
                supplier_reference_id: supplier_reference_id.clone(),
                fulfillment_instance_id: supplier.fulfillment_instance_id.clone(),
                supplier_timeline_version: version,
                party_type: party.party_type,
                party_id: party.party_id.clone(),
                party_name: party.party_name.clone(),
                obligation_type: line.obligation_type.clone(),
                amount: line.amount,
                amount_effect: line.amount_effect,
                currency: line.currency.clone(),
                calculation: line.calculation.clone(),
                description: line.description.clone(),
                ingested_at,
            });
        }
    }

    if supplier.status == SupplierStatus::CancelledWithFee {
        if let Some(cancellation) = &supplier.cancellation {
            if cancellation.fee_amount < 0 {
                return Err(IngestError::Validation(format!(
                    "cancellation fee must be non-negative, got {}",
                    cancellation.fee_amount
                )));
            }
            // Explicit CANCELLATION_FEE lines from the producer win over the
            // cancellation payload.
            let already_present = lines.iter().any(|l| l.obligation_type == CANCELLATION_FEE);
            if !already_present && cancellation.fee_amount > 0 {
                lines.push(SupplierPayableLine {
                    line_id: Uuid::now_v7().to_string(),
                    event_id: event_id.to_string(),
                    order_id: env.order_id.clone(),
                    order_detail_id: body.order_detail_id.clone(),
                    supplier_reference_id: supplier_reference_id.clone(),
                    fulfillment_instance_id: supplier.fulfillment_instance_id.clone(),
                    supplier_timeline_version: version,
                    party_type: PartyType::Supplier,
                    party_id: supplier.supplier_id.clone(),
                    party_name: None,
                    obligation_type: CANCELLATION_FEE.to_string(),
                    amount: cancellation.fee_amount,
                    amount_effect: AmountEffect::IncreasesPayable,
                    currency: cancellation
                        .currency
                        .clone()
                        .unwrap_or_else(|| supplier.currency.clone()),
                    calculation: None,
                    description: cancellation.reason.clone(),
                    ingested_at,
                });
            }
        }
    }

    let commit = pipeline
        .commit_batch(FactBatch::Supplier { timeline, lines })
        .await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Supplier, version))
}
