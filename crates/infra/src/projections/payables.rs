//! Effective supplier payables.
//!
//! A payable **instance** is the tuple `(order_detail_id,
//! supplier_reference_id, fulfillment_instance_id_or_booking)`; a pass with
//! three redemptions is four instances (booking + 3), each with its own
//! timeline and its own total.
//!
//! Per instance:
//!
//! ```text
//! latest     = timeline row with MAX(supplier_timeline_version)
//! baseline   = baseline_for_status(latest)
//! obligations = party-level last-writer-wins projection (see below)
//! total      = baseline + Σ sign(amount_effect) · amount
//! ```
//!
//! ## Baseline by status
//!
//! | Status | Baseline |
//! |--------|----------|
//! | Confirmed, ISSUED, Invoiced, Settled | `latest.amount` |
//! | CancelledWithFee | 0 — the fee is an obligation line |
//! | CancelledNoFee, Voided | 0 |
//! | unknown | `latest.amount`, with a warning |
//!
//! ## Party projection
//!
//! Timeline-linked lines (version ≥ 1) are projected last-writer-wins per
//! `(party_id, obligation_type)`: a later event that re-states an obligation
//! supersedes only the tuples it names, and an event with no lines changes
//! nothing — prior lines stay effective. Under `CancelledNoFee`/`Voided`
//! timeline-linked lines are excluded entirely. Standalone lines
//! (version = -1) are always included.
//!
//! Inconsistent rows (a line pointing past the latest timeline version)
//! surface as per-instance warnings; one bad instance never fails the whole
//! order read.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use uprl_core::{
    AmountEffect, FulfillmentKey, OrderDetailId, OrderId, PartyType, SupplierPayableLine,
    SupplierStatus, SupplierTimelineFact, STANDALONE_VERSION,
};

use crate::fact_store::{FactStore, StoreError, VersionRange};

/// One obligation surviving projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedObligation {
    pub party_type: PartyType,
    pub party_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_name: Option<String>,
    pub obligation_type: String,
    pub amount: i64,
    pub amount_effect: AmountEffect,
    pub currency: String,
    /// `-1` for standalone adjustments.
    pub supplier_timeline_version: i64,
}

/// Effective payables of one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayableInstance {
    pub order_detail_id: OrderDetailId,
    pub supplier_reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_instance_id: Option<String>,
    pub supplier_id: String,
    pub status: String,
    pub currency: String,
    pub baseline: i64,
    pub obligations: Vec<ProjectedObligation>,
    /// Σ sign(amount_effect) · amount over `obligations`.
    pub adjustment: i64,
    /// `baseline + adjustment`.
    pub total: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn baseline_for_status(
    latest: &SupplierTimelineFact,
    warnings: &mut Vec<String>,
) -> (i64, bool) {
    match latest.status_enum() {
        Some(
            SupplierStatus::Confirmed
            | SupplierStatus::Issued
            | SupplierStatus::Invoiced
            | SupplierStatus::Settled,
        ) => (latest.amount, true),
        Some(SupplierStatus::CancelledWithFee) => (0, true),
        Some(SupplierStatus::CancelledNoFee | SupplierStatus::Voided) => (0, false),
        None => {
            warnings.push(format!(
                "unknown supplier status '{}'; using latest amount as baseline",
                latest.status
            ));
            (latest.amount, true)
        }
    }
}

/// Project effective payables from raw fact rows. Pure; deterministic output
/// ordering.
pub fn project_payables(
    timeline: &[SupplierTimelineFact],
    lines: &[SupplierPayableLine],
) -> Vec<PayableInstance> {
    type InstanceKey = (OrderDetailId, String, FulfillmentKey);

    // BTreeMap for deterministic instance ordering.
    let mut instances: BTreeMap<InstanceKey, Vec<&SupplierTimelineFact>> = BTreeMap::new();
    for row in timeline {
        let key = (
            row.order_detail_id.clone(),
            row.supplier_reference_id.clone(),
            row.fulfillment_key(),
        );
        instances.entry(key).or_default().push(row);
    }

    let mut result = Vec::with_capacity(instances.len());

    for ((order_detail_id, supplier_reference_id, fulfillment), rows) in instances {
        // Version decides recency, not arrival order.
        let Some(latest) = rows
            .iter()
            .max_by_key(|r| (r.supplier_timeline_version, r.emitted_at, r.ingested_at))
            .copied()
        else {
            continue;
        };

        let mut warnings = Vec::new();
        let (baseline, include_timeline) = baseline_for_status(latest, &mut warnings);

        let instance_lines: Vec<&SupplierPayableLine> = lines
            .iter()
            .filter(|l| {
                l.order_detail_id == order_detail_id
                    && l.supplier_reference_id == supplier_reference_id
                    && l.fulfillment_key() == fulfillment
            })
            .collect();

        let mut projected: Vec<&SupplierPayableLine> = Vec::new();

        if include_timeline {
            // Last-writer-wins per (party_id, obligation_type) over v >= 1.
            let mut winning_version: BTreeMap<(&str, &str), i64> = BTreeMap::new();
            for line in instance_lines.iter().filter(|l| l.supplier_timeline_version >= 1) {
                let key = (line.party_id.as_str(), line.obligation_type.as_str());
                let entry = winning_version.entry(key).or_insert(i64::MIN);
                *entry = (*entry).max(line.supplier_timeline_version);
            }
            for line in instance_lines.iter().copied().filter(|l| l.supplier_timeline_version >= 1) {
                let key = (line.party_id.as_str(), line.obligation_type.as_str());
                if winning_version.get(&key) == Some(&line.supplier_timeline_version) {
                    projected.push(line);
                }
                if line.supplier_timeline_version > latest.supplier_timeline_version {
                    warnings.push(format!(
                        "line '{}' for party '{}' references version {} past the latest \
                         timeline version {}",
                        line.obligation_type,
                        line.party_id,
                        line.supplier_timeline_version,
                        latest.supplier_timeline_version
                    ));
                }
            }
        }

        // Standalone adjustments persist regardless of status.
        projected.extend(
            instance_lines
                .iter()
                .copied()
                .filter(|l| l.supplier_timeline_version == STANDALONE_VERSION),
        );

        projected.sort_by(|a, b| {
            (&a.party_id, &a.obligation_type, a.supplier_timeline_version, &a.line_id).cmp(&(
                &b.party_id,
                &b.obligation_type,
                b.supplier_timeline_version,
                &b.line_id,
            ))
        });

        let adjustment: i64 = projected.iter().map(|l| l.signed_amount()).sum();
        let obligations: Vec<ProjectedObligation> = projected
            .into_iter()
            .map(|l| ProjectedObligation {
                party_type: l.party_type,
                party_id: l.party_id.clone(),
                party_name: l.party_name.clone(),
                obligation_type: l.obligation_type.clone(),
                amount: l.amount,
                amount_effect: l.amount_effect,
                currency: l.currency.clone(),
                supplier_timeline_version: l.supplier_timeline_version,
            })
            .collect();

        result.push(PayableInstance {
            order_detail_id,
            supplier_reference_id,
            fulfillment_instance_id: fulfillment.as_column().map(str::to_string),
            supplier_id: latest.supplier_id.clone(),
            status: latest.status.clone(),
            currency: latest.currency.clone(),
            baseline,
            obligations,
            adjustment,
            total: baseline + adjustment,
            warnings,
        });
    }

    result
}

/// Store-reading wrapper around [`project_payables`]. Holds no state and
/// never writes.
pub struct PayablesProjector {
    store: Arc<dyn FactStore>,
}

impl PayablesProjector {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self { store }
    }

    pub async fn effective_payables(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<PayableInstance>, StoreError> {
        let timeline = self
            .store
            .supplier_timeline(order_id, VersionRange::all())
            .await?;
        let lines = self.store.payable_lines(order_id).await?;
        Ok(project_payables(&timeline, &lines))
    }
}
