//! PartnerAdjustment handler.
//!
//! Writes a single standalone payable line with version `-1`, bypassing the
//! version registry entirely. Standalone lines have no timeline parent and
//! persist across supplier status changes.

use chrono::Utc;
use uuid::Uuid;

use uprl_core::{SupplierPayableLine, VersionFamily, STANDALONE_VERSION};
use uprl_events::{EventEnvelope, PartnerAdjustmentBody};

use crate::fact_store::FactBatch;

use super::{IngestError, IngestOutcome, IngestionPipeline};

pub(super) async fn handle(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = PartnerAdjustmentBody::from_envelope(env)?;

    let line = SupplierPayableLine {
        line_id: Uuid::now_v7().to_string(),
        event_id: event_id.to_string(),
        order_id: env.order_id.clone(),
        order_detail_id: body.order_detail_id,
        supplier_reference_id: body.supplier_reference_id,
        fulfillment_instance_id: body.fulfillment_instance_id,
        supplier_timeline_version: STANDALONE_VERSION,
        party_type: body.party_type,
        party_id: body.party_id,
        party_name: body.party_name,
        obligation_type: body.obligation_type,
        amount: body.amount,
        amount_effect: body.amount_effect,
        currency: body.currency,
        calculation: body.calculation,
        description: body.description,
        ingested_at: Utc::now(),
    };

    let commit = pipeline.commit_batch(FactBatch::Adjustment(line)).await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Supplier, STANDALONE_VERSION))
}
