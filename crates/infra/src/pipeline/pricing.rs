//! PricingUpdated handler.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use uprl_core::{
    canonical_dimensions, instance_id, semantic_id, CanonicalComponentType, OrderId,
    PricingComponentFact, RefundId, VersionFamily, VersionScope,
};
use uprl_events::{EventEnvelope, PricingComponent, PricingUpdatedBody};

use crate::fact_store::{FactBatch, VersionRange};

use super::{IngestError, IngestOutcome, IngestionPipeline};

pub(super) async fn handle(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = PricingUpdatedBody::from_envelope(env)?;

    if body.components.is_empty() {
        return Err(IngestError::Validation(
            "components must contain at least one component".to_string(),
        ));
    }

    // A non-refund event may still carry refund components (mixed snapshot);
    // each one must then satisfy the refund invariants on its own.
    for (idx, component) in body.components.iter().enumerate() {
        if component.is_refund {
            if component
                .refund_of_component_semantic_id
                .as_deref()
                .map_or(true, str::is_empty)
            {
                return Err(IngestError::Validation(format!(
                    "component [{idx}] is marked is_refund but carries no lineage"
                )));
            }
            if component.amount >= 0 {
                return Err(IngestError::Validation(format!(
                    "refund component [{idx}] amount must be negative, got {}",
                    component.amount
                )));
            }
        }
    }

    if let Some(totals) = &body.totals {
        let sum: i64 = body.components.iter().map(|c| c.amount).sum();
        if sum != totals.customer_total {
            // Mismatch is a producer-side bookkeeping bug, not grounds to
            // drop pricing facts.
            tracing::warn!(
                order_id = %env.order_id,
                component_sum = sum,
                customer_total = totals.customer_total,
                "component sum does not match declared customer_total"
            );
        }
    }

    if !body.detail_contexts.is_empty() {
        warn_on_unresolved_details(env, &body);
    }

    let _guard = pipeline.locks.acquire(&env.order_id).await;

    let version = assign_pricing_version(pipeline, &env.order_id, body.version).await?;
    let snapshot_id = Uuid::now_v7().to_string();
    let facts = build_component_facts(
        env,
        event_id,
        version,
        &snapshot_id,
        None,
        &body.components,
        Utc::now(),
    )?;

    let commit = pipeline.commit_batch(FactBatch::Pricing(facts)).await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Pricing, version))
}

fn warn_on_unresolved_details(env: &EventEnvelope, body: &PricingUpdatedBody) {
    let known: HashSet<&str> = body
        .detail_contexts
        .iter()
        .map(|ctx| ctx.order_detail_id.as_str())
        .collect();

    for component in &body.components {
        if let Some(detail) = component
            .dimensions
            .get("order_detail_id")
            .and_then(|v| v.as_str())
        {
            if !known.contains(detail) {
                tracing::warn!(
                    order_id = %env.order_id,
                    order_detail_id = detail,
                    "component references an order_detail_id with no detail_context"
                );
            }
        }
    }
}

/// Assign the pricing version under the caller-held scope lock.
///
/// A producer-pinned version is honored verbatim: lower-than-max pins are
/// out-of-order re-deliveries (accepted), gaps are tolerated but logged, and
/// an exact duplicate is rejected — versions never repeat within a scope.
pub(super) async fn assign_pricing_version(
    pipeline: &IngestionPipeline,
    order_id: &OrderId,
    pinned: Option<i64>,
) -> Result<i64, IngestError> {
    let scope = VersionScope::Pricing {
        order_id: order_id.clone(),
    };

    let Some(pinned) = pinned else {
        return Ok(pipeline.registry.next(&scope).await?);
    };

    let existing = pipeline
        .store
        .pricing_components(order_id, VersionRange::exactly(pinned))
        .await?;
    if !existing.is_empty() {
        return Err(IngestError::Validation(format!(
            "pricing version {pinned} already present for order {order_id}"
        )));
    }

    let current = pipeline.registry.current(&scope).await?.unwrap_or(0);
    if pinned > current + 1 {
        tracing::warn!(
            %order_id,
            pinned,
            current,
            "pinned pricing version leaves a gap"
        );
    } else if pinned <= current {
        tracing::info!(%order_id, pinned, current, "out-of-order pricing version accepted");
    }

    Ok(pinned)
}

/// Build the fact rows for one pricing/refund snapshot.
pub(super) fn build_component_facts(
    env: &EventEnvelope,
    event_id: &str,
    version: i64,
    snapshot_id: &str,
    refund_id: Option<&RefundId>,
    components: &[PricingComponent],
    ingested_at: DateTime<Utc>,
) -> Result<Vec<PricingComponentFact>, IngestError> {
    let mut seen = HashSet::with_capacity(components.len());
    let mut facts = Vec::with_capacity(components.len());

    for component in components {
        let semantic = semantic_id(
            &env.order_id,
            refund_id,
            &component.dimensions,
            &component.component_type,
        )?;
        let instance = instance_id(&semantic, snapshot_id);

        if !seen.insert(instance.clone()) {
            return Err(IngestError::Validation(format!(
                "duplicate component identity '{semantic}' within one snapshot"
            )));
        }

        facts.push(PricingComponentFact {
            component_instance_id: instance,
            component_semantic_id: semantic,
            event_id: event_id.to_string(),
            order_id: env.order_id.clone(),
            pricing_snapshot_id: snapshot_id.to_string(),
            version,
            component_type: component.component_type.clone(),
            canonical_component_type: CanonicalComponentType::from_raw(
                &component.component_type,
            ),
            amount: component.amount,
            currency: component.currency.clone(),
            dimensions: canonical_dimensions(&component.dimensions)?,
            description: component.description.clone(),
            is_refund: refund_id.is_some() || component.is_refund,
            refund_of_component_semantic_id: component.refund_of_component_semantic_id.clone(),
            emitter_service: env.emitter_service.clone(),
            emitted_at: env.emitted_at,
            ingested_at,
            metadata: env.meta.clone(),
        });
    }

    Ok(facts)
}
