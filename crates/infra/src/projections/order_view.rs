//! Latest-state views: per-family "latest row" projections.
//!
//! Recency is decided by **version**, never by arrival order; ties break by
//! `emitted_at`, then `ingested_at`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use uprl_core::{
    FulfillmentKey, OrderDetailId, OrderId, PaymentTimelineFact, PricingComponentFact, RefundId,
    RefundTimelineFact, SupplierTimelineFact,
};

use crate::fact_store::{FactStore, StoreError, VersionRange};

/// Unified read model of one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    /// Latest row per semantic component.
    pub pricing_latest: Vec<PricingComponentFact>,
    /// Latest payment lifecycle row, if any payment event arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_latest: Option<PaymentTimelineFact>,
    /// Latest row per payable instance.
    pub supplier_latest: Vec<SupplierTimelineFact>,
    /// Latest row per refund.
    pub refund_latest: Vec<RefundTimelineFact>,
}

/// Per-version rollup of a pricing snapshot (history listing).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingVersionSummary {
    pub version: i64,
    pub pricing_snapshot_id: String,
    pub component_count: usize,
    pub total_amount: i64,
    pub currency: String,
    pub emitted_at: DateTime<Utc>,
}

/// Latest row per `(order_id, component_semantic_id)`.
pub fn pricing_latest(rows: &[PricingComponentFact]) -> Vec<PricingComponentFact> {
    let mut latest: BTreeMap<&str, &PricingComponentFact> = BTreeMap::new();
    for row in rows {
        let candidate = (row.version, row.emitted_at, row.ingested_at);
        match latest.get(row.component_semantic_id.as_str()) {
            Some(current) if (current.version, current.emitted_at, current.ingested_at) >= candidate => {}
            _ => {
                latest.insert(row.component_semantic_id.as_str(), row);
            }
        }
    }

    let mut out: Vec<PricingComponentFact> = latest.into_values().cloned().collect();
    out.sort_by(|a, b| {
        (&a.component_type, &a.component_semantic_id)
            .cmp(&(&b.component_type, &b.component_semantic_id))
    });
    out
}

/// Latest row per payable instance.
pub fn supplier_latest(rows: &[SupplierTimelineFact]) -> Vec<SupplierTimelineFact> {
    let mut latest: BTreeMap<(OrderDetailId, String, FulfillmentKey), &SupplierTimelineFact> =
        BTreeMap::new();
    for row in rows {
        let key = (
            row.order_detail_id.clone(),
            row.supplier_reference_id.clone(),
            row.fulfillment_key(),
        );
        let candidate = (row.supplier_timeline_version, row.emitted_at, row.ingested_at);
        match latest.get(&key) {
            Some(current)
                if (current.supplier_timeline_version, current.emitted_at, current.ingested_at)
                    >= candidate => {}
            _ => {
                latest.insert(key, row);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Latest row per `(order_id, refund_id)`.
pub fn refund_latest(rows: &[RefundTimelineFact]) -> Vec<RefundTimelineFact> {
    let mut latest: BTreeMap<RefundId, &RefundTimelineFact> = BTreeMap::new();
    for row in rows {
        let candidate = (row.refund_timeline_version, row.emitted_at, row.ingested_at);
        match latest.get(&row.refund_id) {
            Some(current)
                if (current.refund_timeline_version, current.emitted_at, current.ingested_at)
                    >= candidate => {}
            _ => {
                latest.insert(row.refund_id.clone(), row);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Read-only derived views over the fact store.
pub struct LatestStateViews {
    store: Arc<dyn FactStore>,
}

impl LatestStateViews {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self { store }
    }

    /// The unified latest-state view of one order.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<OrderReadModel, StoreError> {
        let pricing = self
            .store
            .pricing_components(order_id, VersionRange::all())
            .await?;
        let payments = self
            .store
            .payment_timeline(order_id, VersionRange::all())
            .await?;
        let suppliers = self
            .store
            .supplier_timeline(order_id, VersionRange::all())
            .await?;
        let refunds = self
            .store
            .refund_timeline(order_id, VersionRange::all())
            .await?;

        let payment_latest = payments
            .iter()
            .max_by_key(|r| (r.timeline_version, r.emitted_at, r.ingested_at))
            .cloned();

        Ok(OrderReadModel {
            order_id: order_id.clone(),
            pricing_latest: pricing_latest(&pricing),
            payment_latest,
            supplier_latest: supplier_latest(&suppliers),
            refund_latest: refund_latest(&refunds),
        })
    }

    /// Per-version pricing rollups, newest first.
    pub async fn pricing_history(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PricingVersionSummary>, StoreError> {
        let rows = self.store.pricing_components(order_id, range).await?;

        let mut groups: BTreeMap<(i64, String, String), (usize, i64, DateTime<Utc>)> =
            BTreeMap::new();
        for row in &rows {
            let key = (
                row.version,
                row.pricing_snapshot_id.clone(),
                row.currency.clone(),
            );
            let entry = groups.entry(key).or_insert((0, 0, row.emitted_at));
            entry.0 += 1;
            entry.1 += row.amount;
            entry.2 = entry.2.max(row.emitted_at);
        }

        let mut summaries: Vec<PricingVersionSummary> = groups
            .into_iter()
            .map(
                |((version, pricing_snapshot_id, currency), (count, total, emitted_at))| {
                    PricingVersionSummary {
                        version,
                        pricing_snapshot_id,
                        component_count: count,
                        total_amount: total,
                        currency,
                        emitted_at,
                    }
                },
            )
            .collect();
        summaries.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uprl_core::CanonicalComponentType;

    fn component(
        semantic: &str,
        version: i64,
        amount: i64,
        snapshot: &str,
    ) -> PricingComponentFact {
        PricingComponentFact {
            component_instance_id: format!("{semantic}-{snapshot}"),
            component_semantic_id: semantic.to_string(),
            event_id: format!("evt-{version}"),
            order_id: OrderId::new("ORD-9001"),
            pricing_snapshot_id: snapshot.to_string(),
            version,
            component_type: "RoomRate".to_string(),
            canonical_component_type: CanonicalComponentType::RoomRate,
            amount,
            currency: "IDR".to_string(),
            dimensions: json!({}),
            description: None,
            is_refund: false,
            refund_of_component_semantic_id: None,
            emitter_service: None,
            emitted_at: Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap(),
            metadata: None,
        }
    }

    #[test]
    fn highest_version_wins_regardless_of_arrival_order() {
        // v3 arrived before v2; the view must still pick v3.
        let rows = vec![
            component("cs-ORD-9001-RoomRate", 3, 550000, "snap-3"),
            component("cs-ORD-9001-RoomRate", 2, 520000, "snap-2"),
        ];
        let latest = pricing_latest(&rows);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].version, 3);
        assert_eq!(latest[0].amount, 550000);
    }

    #[test]
    fn each_semantic_component_projects_independently() {
        let rows = vec![
            component("cs-ORD-9001-RoomRate", 1, 500000, "snap-1"),
            component("cs-ORD-9001-Tax", 1, 110000, "snap-1"),
            component("cs-ORD-9001-RoomRate", 2, 525000, "snap-2"),
        ];
        let latest = pricing_latest(&rows);
        assert_eq!(latest.len(), 2);
        let room = latest
            .iter()
            .find(|r| r.component_semantic_id.ends_with("RoomRate"))
            .unwrap();
        assert_eq!(room.version, 2);
    }

    #[test]
    fn pricing_history_rolls_up_per_version() {
        let rows = vec![
            component("cs-ORD-9001-RoomRate", 1, 500000, "snap-1"),
            component("cs-ORD-9001-Tax", 1, 110000, "snap-1"),
            component("cs-ORD-9001-RoomRate", 2, 525000, "snap-2"),
        ];

        let mut groups: BTreeMap<i64, (usize, i64)> = BTreeMap::new();
        for row in &rows {
            let entry = groups.entry(row.version).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += row.amount;
        }
        assert_eq!(groups[&1], (2, 610000));
        assert_eq!(groups[&2], (1, 525000));
    }
}
