//! In-memory append-only fact store.
//!
//! Intended for tests/dev. Not optimized for performance: reads scan and
//! clone. A single `RwLock` over all tables makes batch commits trivially
//! atomic.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;

use uprl_core::{
    DlqEntry, OrderId, PaymentTimelineFact, PricingComponentFact, RefundTimelineFact,
    SupplierPayableLine, SupplierTimelineFact, VersionScope,
};

use super::r#trait::{
    CommitOutcome, ComponentLineage, DlqFilter, FactBatch, FactStore, StoreError, VersionRange,
};

#[derive(Debug, Default)]
struct Tables {
    pricing: Vec<PricingComponentFact>,
    payment: Vec<PaymentTimelineFact>,
    supplier: Vec<SupplierTimelineFact>,
    payable_lines: Vec<SupplierPayableLine>,
    refunds: Vec<RefundTimelineFact>,
    dlq: Vec<DlqEntry>,
}

impl Tables {
    fn event_exists(&self, batch: &FactBatch) -> bool {
        let event_id = batch.event_id();
        match batch {
            FactBatch::Pricing(_) => self.pricing.iter().any(|r| r.event_id == event_id),
            FactBatch::Payment(_) => self.payment.iter().any(|r| r.event_id == event_id),
            FactBatch::Supplier { .. } => self.supplier.iter().any(|r| r.event_id == event_id),
            FactBatch::Refund(_) => self.refunds.iter().any(|r| r.event_id == event_id),
            FactBatch::Adjustment(_) => {
                self.payable_lines.iter().any(|r| r.event_id == event_id)
            }
        }
    }
}

/// In-memory fact store backed by `RwLock`-guarded vectors.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    tables: RwLock<Tables>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

fn sort_key(version: i64, emitted_at: chrono::DateTime<chrono::Utc>) -> (i64, chrono::DateTime<chrono::Utc>) {
    (version, emitted_at)
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn commit(&self, batch: FactBatch) -> Result<CommitOutcome, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;

        if tables.event_exists(&batch) {
            return Ok(CommitOutcome::DuplicateEvent);
        }

        let rows = batch.row_count();
        match batch {
            FactBatch::Pricing(components) => {
                for component in components {
                    // Row-level idempotency on the primary key.
                    if !tables
                        .pricing
                        .iter()
                        .any(|r| r.component_instance_id == component.component_instance_id)
                    {
                        tables.pricing.push(component);
                    }
                }
            }
            FactBatch::Payment(row) => tables.payment.push(row),
            FactBatch::Supplier { timeline, lines } => {
                tables.supplier.push(timeline);
                for line in lines {
                    if !tables.payable_lines.iter().any(|r| r.line_id == line.line_id) {
                        tables.payable_lines.push(line);
                    }
                }
            }
            FactBatch::Refund(row) => tables.refunds.push(row),
            FactBatch::Adjustment(line) => tables.payable_lines.push(line),
        }

        Ok(CommitOutcome::Committed { rows })
    }

    async fn max_version(&self, scope: &VersionScope) -> Result<Option<i64>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;

        let max = match scope {
            VersionScope::Pricing { order_id } => tables
                .pricing
                .iter()
                .filter(|r| &r.order_id == order_id)
                .map(|r| r.version)
                .max(),
            VersionScope::Payment { order_id } => tables
                .payment
                .iter()
                .filter(|r| &r.order_id == order_id)
                .map(|r| r.timeline_version)
                .max(),
            VersionScope::Supplier {
                order_id,
                order_detail_id,
                supplier_reference_id,
                fulfillment,
            } => tables
                .supplier
                .iter()
                .filter(|r| {
                    &r.order_id == order_id
                        && &r.order_detail_id == order_detail_id
                        && &r.supplier_reference_id == supplier_reference_id
                        && &r.fulfillment_key() == fulfillment
                })
                .map(|r| r.supplier_timeline_version)
                .max(),
            VersionScope::Refund {
                order_id,
                refund_id,
            } => tables
                .refunds
                .iter()
                .filter(|r| &r.order_id == order_id && &r.refund_id == refund_id)
                .map(|r| r.refund_timeline_version)
                .max(),
            // Reserved family; no backing table yet.
            VersionScope::Issuance { .. } => None,
        };

        Ok(max)
    }

    async fn pricing_components(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PricingComponentFact>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<_> = tables
            .pricing
            .iter()
            .filter(|r| &r.order_id == order_id && range.contains(r.version))
            .cloned()
            .collect();
        rows.sort_by(|a, b| sort_key(a.version, a.emitted_at).cmp(&sort_key(b.version, b.emitted_at)));
        Ok(rows)
    }

    async fn payment_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PaymentTimelineFact>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<_> = tables
            .payment
            .iter()
            .filter(|r| &r.order_id == order_id && range.contains(r.timeline_version))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            sort_key(a.timeline_version, a.emitted_at).cmp(&sort_key(b.timeline_version, b.emitted_at))
        });
        Ok(rows)
    }

    async fn supplier_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<SupplierTimelineFact>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<_> = tables
            .supplier
            .iter()
            .filter(|r| &r.order_id == order_id && range.contains(r.supplier_timeline_version))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            sort_key(a.supplier_timeline_version, a.emitted_at)
                .cmp(&sort_key(b.supplier_timeline_version, b.emitted_at))
        });
        Ok(rows)
    }

    async fn payable_lines(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SupplierPayableLine>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<_> = tables
            .payable_lines
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.supplier_timeline_version, &a.party_id, &a.obligation_type, &a.line_id)
                .cmp(&(b.supplier_timeline_version, &b.party_id, &b.obligation_type, &b.line_id))
        });
        Ok(rows)
    }

    async fn refund_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<RefundTimelineFact>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<_> = tables
            .refunds
            .iter()
            .filter(|r| &r.order_id == order_id && range.contains(r.refund_timeline_version))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.refund_id, a.refund_timeline_version).cmp(&(&b.refund_id, b.refund_timeline_version))
        });
        Ok(rows)
    }

    async fn component_lineage(
        &self,
        semantic_id: &str,
    ) -> Result<ComponentLineage, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;

        let mut original: Vec<_> = tables
            .pricing
            .iter()
            .filter(|r| r.component_semantic_id == semantic_id && !r.is_refund)
            .cloned()
            .collect();
        original.sort_by_key(|r| r.version);

        let mut refunds: Vec<_> = tables
            .pricing
            .iter()
            .filter(|r| {
                r.is_refund && r.refund_of_component_semantic_id.as_deref() == Some(semantic_id)
            })
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.version);

        Ok(ComponentLineage { original, refunds })
    }

    async fn order_ids(&self) -> Result<Vec<OrderId>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let ids: BTreeSet<OrderId> = tables
            .pricing
            .iter()
            .map(|r| r.order_id.clone())
            .chain(tables.payment.iter().map(|r| r.order_id.clone()))
            .chain(tables.supplier.iter().map(|r| r.order_id.clone()))
            .chain(tables.refunds.iter().map(|r| r.order_id.clone()))
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn push_dlq(&self, entry: DlqEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.dlq.push(entry);
        Ok(())
    }

    async fn list_dlq(&self, filter: DlqFilter) -> Result<Vec<DlqEntry>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let rows: Vec<_> = tables
            .dlq
            .iter()
            .filter(|e| {
                filter.error_kind.map_or(true, |kind| e.error_kind == kind)
                    && filter
                        .order_id
                        .as_ref()
                        .map_or(true, |id| e.order_id.as_ref() == Some(id))
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }
}
