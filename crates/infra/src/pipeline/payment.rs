//! PaymentLifecycle handler.

use chrono::Utc;

use uprl_core::{PaymentTimelineFact, VersionFamily, VersionScope};
use uprl_events::{EventEnvelope, PaymentLifecycleBody};

use crate::fact_store::FactBatch;

use super::{IngestError, IngestOutcome, IngestionPipeline};

pub(super) async fn handle(
    pipeline: &IngestionPipeline,
    env: &EventEnvelope,
    event_id: &str,
) -> Result<IngestOutcome, IngestError> {
    let body = PaymentLifecycleBody::from_envelope(env)?;
    let payment = body.payment;

    let instrument = payment
        .instrument
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| IngestError::Validation(format!("instrument serialization: {e}")))?;

    let scope = VersionScope::Payment {
        order_id: env.order_id.clone(),
    };

    let _guard = pipeline.locks.acquire(&env.order_id).await;
    let version = pipeline.registry.next(&scope).await?;

    let fact = PaymentTimelineFact {
        event_id: event_id.to_string(),
        order_id: env.order_id.clone(),
        timeline_version: version,
        status: payment.status.as_str().to_string(),
        payment_method: payment.payment_method,
        payment_id: payment.payment_id,
        pg_reference_id: payment.pg_reference_id,
        authorized_amount: payment.authorized_amount,
        captured_amount: payment.captured_amount,
        captured_amount_total: payment.captured_amount_total,
        currency: payment.currency,
        instrument,
        emitter_service: env.emitter_service.clone(),
        emitted_at: env.emitted_at,
        ingested_at: Utc::now(),
        metadata: env.meta.clone(),
    };

    let commit = pipeline.commit_batch(FactBatch::Payment(fact)).await?;
    Ok(pipeline.committed(commit, event_id, VersionFamily::Payment, version))
}
