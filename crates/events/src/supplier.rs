//! SupplierLifecycle body (`supplier.timeline.v1` / `v2`).
//!
//! v2 adds the multi-party obligation breakdown and the
//! `fulfillment_instance_id` dimension. A v1 event carrying either is
//! rejected rather than half-interpreted.
//!
//! `parties` distinguishes three inbound states:
//! - absent — legacy event, implicit empty
//! - `[]` — intentional no-op ("nothing changed"; prior lines stay effective
//!   via projection)
//! - non-empty — supersedes the `(party_id, obligation_type)` tuples it names

use serde::Deserialize;
use serde_json::Value as JsonValue;

use uprl_core::{AmountBasis, AmountEffect, OrderDetailId, PartyType, SupplierStatus};

use crate::envelope::{EventEnvelope, ParseError};
use crate::kind::SchemaVersion;
use crate::pricing::FxContext;

/// One obligation line under a party.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObligationLine {
    pub obligation_type: String,
    /// Unsigned magnitude; direction lives in `amount_effect`.
    pub amount: i64,
    pub currency: String,
    #[serde(default = "default_effect")]
    pub amount_effect: AmountEffect,
    #[serde(default)]
    pub calculation: Option<JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_effect() -> AmountEffect {
    AmountEffect::IncreasesPayable
}

/// A party and its obligation lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Party {
    pub party_type: PartyType,
    pub party_id: String,
    #[serde(default)]
    pub party_name: Option<String>,
    pub lines: Vec<ObligationLine>,
}

/// Cancellation details; under `CancelledWithFee` the fee becomes a
/// `CANCELLATION_FEE` obligation line at the event's version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cancellation {
    pub fee_amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The nested `supplier` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplierPayload {
    pub status: SupplierStatus,
    pub supplier_id: String,
    #[serde(default)]
    pub booking_code: Option<String>,
    #[serde(default)]
    pub supplier_ref: Option<String>,
    #[serde(default)]
    pub fulfillment_instance_id: Option<String>,
    pub amount_due: i64,
    #[serde(default)]
    pub amount_basis: Option<AmountBasis>,
    pub currency: String,
    #[serde(default)]
    pub fx_context: Option<FxContext>,
    #[serde(default)]
    pub entity_context: Option<JsonValue>,
    #[serde(default)]
    pub cancellation: Option<Cancellation>,
}

#[derive(Debug, Deserialize)]
struct SupplierBodyWire {
    order_detail_id: OrderDetailId,
    supplier: SupplierPayload,
    #[serde(default)]
    parties: Option<Vec<Party>>,
}

/// Canonical SupplierLifecycle body.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierLifecycleBody {
    pub order_detail_id: OrderDetailId,
    pub supplier: SupplierPayload,
    /// `None` = field absent (legacy implicit empty); `Some(vec![])` =
    /// intentional no-op.
    pub parties: Option<Vec<Party>>,
}

impl SupplierLifecycleBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        let wire: SupplierBodyWire = env.body_as()?;

        if env.schema_version == SchemaVersion::SupplierTimelineV1 {
            if wire.parties.is_some() {
                return Err(ParseError::body(
                    "parties requires supplier.timeline.v2",
                ));
            }
            if wire.supplier.fulfillment_instance_id.is_some() {
                return Err(ParseError::body(
                    "fulfillment_instance_id requires supplier.timeline.v2",
                ));
            }
        }

        // The empty string is not a valid instance; absent is the distinct
        // booking-level key.
        if wire
            .supplier
            .fulfillment_instance_id
            .as_deref()
            .is_some_and(|v| v.is_empty())
        {
            return Err(ParseError::body(
                "fulfillment_instance_id must be non-empty when present",
            ));
        }

        if let Some(parties) = &wire.parties {
            for party in parties {
                for line in &party.lines {
                    if line.amount < 0 {
                        return Err(ParseError::body(format!(
                            "obligation '{}' for party '{}' has negative amount; \
                             use amount_effect for direction",
                            line.obligation_type, party.party_id
                        )));
                    }
                }
            }
        }

        Ok(Self {
            order_detail_id: wire.order_detail_id,
            supplier: wire.supplier,
            parties: wire.parties,
        })
    }

    /// The reference that scopes this event's payable instance.
    pub fn supplier_reference_id(&self) -> String {
        self.supplier
            .supplier_ref
            .clone()
            .or_else(|| self.supplier.booking_code.clone())
            .unwrap_or_else(|| self.supplier.supplier_id.clone())
    }
}
