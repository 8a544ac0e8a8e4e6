//! Refund handlers: `refund.issued` (pricing components with lineage) and
//! `RefundLifecycle` (status-only timeline).
//!
//! Refund components live in the **pricing** family: they are new pricing
//! facts whose semantic ids include the refund id, linked back to the
//! original component through `refund_of_component_semantic_id`.

use chrono::Utc;
use uuid::Uuid;

use uprl_core::{RefundTimelineFact, VersionFamily, VersionScope};
use uprl_events::{EventEnvelope, RefundIssuedBody, RefundLifecycleBody};

use crate::fact_store::FactBatch;

use super::pricing::{assign_pricing_version, build_component_facts};
use super::{IngestError, IngestOutcome, IngestionPipeline};

pub(super) async fn handle_issued(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = RefundIssuedBody::from_envelope(env)?;

    if body.components.is_empty() {
        return Err(IngestError::Validation(
            "components must contain at least one component".to_string(),
        ));
    }

    let _guard = pipeline.locks.acquire(&env.order_id).await;

    let version = assign_pricing_version(pipeline, &env.order_id, body.version).await?;
    let snapshot_id = Uuid::now_v7().to_string();
    let facts = build_component_facts(
        env,
        event_id,
        version,
        &snapshot_id,
        Some(&body.refund_id),
        &body.components,
        Utc::now(),
    )?;

    let commit = pipeline.commit_batch(FactBatch::Pricing(facts)).await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Pricing, version))
}

pub(super) async fn handle_lifecycle(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = RefundLifecycleBody::from_envelope(env)?;

    let scope = VersionScope::Refund {
        order_id: env.order_id.clone(),
        refund_id: body.refund_id.clone(),
    };

    let _guard = pipeline.locks.acquire(&env.order_id).await;
    let version = pipeline.registry.next(&scope).await?;

    let fact = RefundTimelineFact {
        event_id: event_id.to_string(),
        order_id: env.order_id.clone(),
        refund_id: body.refund_id,
        refund_timeline_version: version,
        status: body.status.as_str().to_string(),
        refund_amount: body.refund_amount,
        currency: body.currency,
        reason: body.refund_reason,
        emitter_service: env.emitter_service.clone(),
        emitted_at: env.emitted_at,
        ingested_at: Utc::now(),
        metadata: env.meta.clone(),
    };

    let commit = pipeline.commit_batch(FactBatch::Refund(fact)).await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Refund, version))
}
