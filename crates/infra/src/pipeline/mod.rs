//! Ingestion pipeline: validate → route → normalize → version → persist.
//!
//! The pipeline is the only writer in the Core. Every inbound event runs
//! through the same stages:
//!
//! 1. **Shape validation** — envelope + body parsing. Failures go to the DLQ
//!    and never block the pipeline.
//! 2. **Routing** — by `event_type`, to one of the kind handlers.
//! 3. **Normalization** — identity construction, legacy lifting, version
//!    assignment under the order's shard lock.
//! 4. **Commit** — all rows of the event atomically, with bounded retries.
//!
//! Failure dispositions follow the error-kind table: validation/identity
//! errors dead-letter immediately; storage errors retry with exponential
//! backoff and jitter before dead-lettering; duplicate `event_id`s are
//! skipped silently (logged).

mod adjustment;
mod payment;
mod pricing;
mod refund;
mod supplier;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use uprl_core::{DlqEntry, ErrorKind, IdentityError, OrderId, VersionFamily};
use uprl_events::{EventEnvelope, EventKind, ParseError};

use crate::fact_store::{CommitOutcome, FactBatch, FactStore, StoreError};
use crate::version_registry::{ScopeLocks, VersionRegistry};

/// Pipeline tuning knobs; defaults match the service-level bounds
/// (5 s per storage operation, 30 s per event, 3 commit attempts).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage_timeout: Duration,
    pub event_timeout: Duration,
    pub max_commit_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            event_timeout: Duration::from_secs(30),
            max_commit_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl IngestError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            IngestError::Parse(_) | IngestError::Validation(_) => ErrorKind::Validation,
            IngestError::Identity(_) => ErrorKind::Identity,
            IngestError::VersionConflict(_) => ErrorKind::VersionConflict,
            IngestError::Store(e) => e.kind(),
            IngestError::Timeout(_) => ErrorKind::Storage,
        }
    }
}

/// Final disposition of one ingested event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Committed {
        event_id: String,
        family: VersionFamily,
        version: i64,
        rows: usize,
    },
    /// The `event_id` was already present; nothing was written.
    Duplicate { event_id: String },
    DeadLettered {
        dlq_id: String,
        error_kind: ErrorKind,
        error_detail: String,
    },
}

/// The write path of the Core.
pub struct IngestionPipeline {
    pub(crate) store: Arc<dyn FactStore>,
    pub(crate) registry: VersionRegistry,
    pub(crate) locks: ScopeLocks,
    pub(crate) config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self::with_config(store, PipelineConfig::default())
    }

    pub fn with_config(store: Arc<dyn FactStore>, config: PipelineConfig) -> Self {
        Self {
            registry: VersionRegistry::new(store.clone()),
            locks: ScopeLocks::default(),
            store,
            config,
        }
    }

    /// Ingest one raw inbound event.
    ///
    /// Never fails on bad input — malformed events are parked in the DLQ and
    /// the pipeline moves on. The only error surfaced to the caller is a
    /// store failure while writing the DLQ entry itself.
    pub async fn ingest(&self, raw: JsonValue) -> Result<IngestOutcome, StoreError> {
        let result = tokio::time::timeout(self.config.event_timeout, self.process(&raw)).await;

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => self.dead_letter(&raw, err).await,
            Err(_) => {
                let detail = format!(
                    "event processing exceeded {:?}",
                    self.config.event_timeout
                );
                self.dead_letter(&raw, IngestError::Timeout(detail)).await
            }
        }
    }

    async fn process(&self, raw: &JsonValue) -> Result<IngestOutcome, IngestError> {
        let env = EventEnvelope::parse(raw)?;

        // At-least-once tolerance needs a stable event id; producers that
        // omit one get a generated id (such events cannot be deduplicated).
        let event_id = env
            .event_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        match env.kind {
            EventKind::PricingUpdated => pricing::handle(self, &env, &event_id).await,
            EventKind::PaymentLifecycle => payment::handle(self, &env, &event_id).await,
            EventKind::SupplierLifecycle => supplier::handle(self, &env, &event_id).await,
            EventKind::RefundIssued => refund::handle_issued(self, &env, &event_id).await,
            EventKind::RefundLifecycle => refund::handle_lifecycle(self, &env, &event_id).await,
            EventKind::PartnerAdjustment => adjustment::handle(self, &env, &event_id).await,
        }
    }

    /// Commit a batch with the storage-op timeout and bounded retries.
    ///
    /// Retryable failures (store unavailable, lock race lost) back off
    /// exponentially with jitter; persistent failure surfaces as the final
    /// error and the caller dead-letters.
    pub(crate) async fn commit_batch(
        &self,
        batch: FactBatch,
    ) -> Result<CommitOutcome, IngestError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(
                self.config.storage_timeout,
                self.store.commit(batch.clone()),
            )
            .await;

            let err = match result {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(err)) => err,
                Err(_) => StoreError::Unavailable(format!(
                    "commit exceeded {:?}",
                    self.config.storage_timeout
                )),
            };

            if attempt >= self.config.max_commit_attempts || !err.is_retryable() {
                return match err {
                    StoreError::Conflict(detail) => Err(IngestError::VersionConflict(detail)),
                    other => Err(IngestError::Store(other)),
                };
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "commit failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Exponential backoff with up to 50% random jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay * 2u32.pow(attempt.min(6));
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter)
    }

    pub(crate) fn committed(
        &self,
        commit: CommitOutcome,
        event_id: &str,
        family: VersionFamily,
        version: i64,
    ) -> IngestOutcome {
        match commit {
            CommitOutcome::Committed { rows } => {
                tracing::info!(event_id, %family, version, rows, "event committed");
                IngestOutcome::Committed {
                    event_id: event_id.to_string(),
                    family,
                    version,
                    rows,
                }
            }
            CommitOutcome::DuplicateEvent => {
                // At-least-once delivery: replays are expected, not errors.
                tracing::info!(event_id, %family, "duplicate event_id, skipped");
                IngestOutcome::Duplicate {
                    event_id: event_id.to_string(),
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        raw: &JsonValue,
        err: IngestError,
    ) -> Result<IngestOutcome, StoreError> {
        let error_kind = err.error_kind();
        let error_detail = err.to_string();
        let dlq_id = Uuid::now_v7().to_string();

        let entry = DlqEntry {
            dlq_id: dlq_id.clone(),
            event_id: extract_str(raw, "event_id"),
            event_type: extract_str(raw, "event_type"),
            order_id: extract_str(raw, "order_id").map(OrderId::new),
            raw_event: raw.clone(),
            error_kind,
            error_detail: error_detail.clone(),
            received_at: chrono::Utc::now(),
            retry_count: 0,
        };

        tracing::warn!(%error_kind, %error_detail, dlq_id, "event dead-lettered");

        tokio::time::timeout(self.config.storage_timeout, self.store.push_dlq(entry))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "DLQ write exceeded {:?}",
                    self.config.storage_timeout
                ))
            })??;

        Ok(IngestOutcome::DeadLettered {
            dlq_id,
            error_kind,
            error_detail,
        })
    }
}

fn extract_str(raw: &JsonValue, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
