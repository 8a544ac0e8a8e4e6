//! Fact store contract.
//!
//! Append-only, order-scoped fact persistence.
//!
//! - **No storage assumptions** (works for the in-memory dev/test store and
//!   the Postgres backend alike)
//! - **Atomic commits**: all rows of one event land together or not at all
//! - **Idempotent** on `event_id` (at-least-once delivery tolerance) and on
//!   row primary keys
//! - **Read ordering**: every timeline read returns rows sorted by version
//!   ascending, ties broken by `emitted_at` then `ingested_at`, so
//!   projections are deterministic

use async_trait::async_trait;
use thiserror::Error;

use uprl_core::{
    DlqEntry, ErrorKind, OrderId, PaymentTimelineFact, PricingComponentFact, RefundTimelineFact,
    SupplierPayableLine, SupplierTimelineFact, VersionFamily, VersionScope,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("row serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict(_) => ErrorKind::VersionConflict,
            _ => ErrorKind::Storage,
        }
    }

    /// Whether a retry with backoff can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

/// All rows produced by one inbound event. Committed atomically.
#[derive(Debug, Clone)]
pub enum FactBatch {
    Pricing(Vec<PricingComponentFact>),
    Payment(PaymentTimelineFact),
    Supplier {
        timeline: SupplierTimelineFact,
        lines: Vec<SupplierPayableLine>,
    },
    Refund(RefundTimelineFact),
    /// Standalone partner adjustment: a single line, version `-1`, no
    /// timeline parent.
    Adjustment(SupplierPayableLine),
}

impl FactBatch {
    /// The producing event, used for event-level idempotency.
    pub fn event_id(&self) -> &str {
        match self {
            FactBatch::Pricing(components) => components
                .first()
                .map(|c| c.event_id.as_str())
                .unwrap_or_default(),
            FactBatch::Payment(row) => &row.event_id,
            FactBatch::Supplier { timeline, .. } => &timeline.event_id,
            FactBatch::Refund(row) => &row.event_id,
            FactBatch::Adjustment(line) => &line.event_id,
        }
    }

    pub fn family(&self) -> VersionFamily {
        match self {
            FactBatch::Pricing(_) => VersionFamily::Pricing,
            FactBatch::Payment(_) => VersionFamily::Payment,
            FactBatch::Supplier { .. } | FactBatch::Adjustment(_) => VersionFamily::Supplier,
            FactBatch::Refund(_) => VersionFamily::Refund,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            FactBatch::Pricing(components) => components.len(),
            FactBatch::Supplier { lines, .. } => 1 + lines.len(),
            FactBatch::Payment(_) | FactBatch::Refund(_) | FactBatch::Adjustment(_) => 1,
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { rows: usize },
    /// The `event_id` was already present in the target table; nothing was
    /// written.
    DuplicateEvent,
}

/// Inclusive version range for history reads. `all()` means no bounds.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl VersionRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exactly(version: i64) -> Self {
        Self {
            from: Some(version),
            to: Some(version),
        }
    }

    pub fn contains(&self, version: i64) -> bool {
        self.from.map_or(true, |from| version >= from)
            && self.to.map_or(true, |to| version <= to)
    }
}

/// Filter for DLQ listing.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub error_kind: Option<ErrorKind>,
    pub order_id: Option<OrderId>,
    pub limit: Option<usize>,
}

/// Lineage of one semantic component: its original occurrences and the
/// refund components pointing back at it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ComponentLineage {
    pub original: Vec<PricingComponentFact>,
    pub refunds: Vec<PricingComponentFact>,
}

/// Append-only fact store.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Commit all rows of one event atomically.
    ///
    /// Implementations must skip the whole batch (reporting
    /// [`CommitOutcome::DuplicateEvent`]) when the batch's `event_id` is
    /// already present in the target table, and must tolerate primary-key
    /// replays row by row.
    async fn commit(&self, batch: FactBatch) -> Result<CommitOutcome, StoreError>;

    /// `MAX(version)` for a scope, or `None` when the scope has no rows.
    ///
    /// The read+increment around this call is serialized by the caller's
    /// per-scope lock; counters are never cached.
    async fn max_version(&self, scope: &VersionScope) -> Result<Option<i64>, StoreError>;

    async fn pricing_components(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PricingComponentFact>, StoreError>;

    async fn payment_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PaymentTimelineFact>, StoreError>;

    async fn supplier_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<SupplierTimelineFact>, StoreError>;

    /// All payable lines for an order (timeline-linked and standalone).
    async fn payable_lines(&self, order_id: &OrderId)
        -> Result<Vec<SupplierPayableLine>, StoreError>;

    async fn refund_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<RefundTimelineFact>, StoreError>;

    /// Original occurrences of a semantic component plus the refund rows
    /// whose `refund_of_component_semantic_id` points at it.
    async fn component_lineage(&self, semantic_id: &str)
        -> Result<ComponentLineage, StoreError>;

    /// Distinct order ids across all fact tables.
    async fn order_ids(&self) -> Result<Vec<OrderId>, StoreError>;

    async fn push_dlq(&self, entry: DlqEntry) -> Result<(), StoreError>;

    async fn list_dlq(&self, filter: DlqFilter) -> Result<Vec<DlqEntry>, StoreError>;
}
