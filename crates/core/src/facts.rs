//! Normalized fact rows and their enumerations.
//!
//! One row type per append-only table. Rows are created by the ingestion
//! pipeline, persisted by the fact store, and never mutated afterwards.
//! Amounts are signed integers in minor currency units.
//!
//! Lifecycle statuses are persisted as **raw strings** and parsed leniently
//! on the read side: producers evolve faster than consumers, and an unknown
//! status must degrade to the projector's warn path instead of poisoning
//! the row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ErrorKind;
use crate::id::{OrderDetailId, OrderId, RefundId};
use crate::version::FulfillmentKey;

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Directional effect of an obligation line on the payable total.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountEffect {
    #[serde(rename = "INCREASES_PAYABLE")]
    IncreasesPayable,
    #[serde(rename = "DECREASES_PAYABLE")]
    DecreasesPayable,
}

impl AmountEffect {
    /// `+1` for increases, `-1` for decreases. The sign lives here, never in
    /// the line magnitude.
    pub fn sign(&self) -> i64 {
        match self {
            AmountEffect::IncreasesPayable => 1,
            AmountEffect::DecreasesPayable => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmountEffect::IncreasesPayable => "INCREASES_PAYABLE",
            AmountEffect::DecreasesPayable => "DECREASES_PAYABLE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INCREASES_PAYABLE" => Some(AmountEffect::IncreasesPayable),
            "DECREASES_PAYABLE" => Some(AmountEffect::DecreasesPayable),
            _ => None,
        }
    }
}

/// Role of the obligated party on a payable line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyType {
    Supplier,
    Affiliate,
    TaxAuthority,
    Internal,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Supplier => "SUPPLIER",
            PartyType::Affiliate => "AFFILIATE",
            PartyType::TaxAuthority => "TAX_AUTHORITY",
            PartyType::Internal => "INTERNAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SUPPLIER" => Some(PartyType::Supplier),
            "AFFILIATE" => Some(PartyType::Affiliate),
            "TAX_AUTHORITY" => Some(PartyType::TaxAuthority),
            "INTERNAL" => Some(PartyType::Internal),
            _ => None,
        }
    }
}

/// Supplier lifecycle status (known set).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplierStatus {
    Confirmed,
    #[serde(rename = "ISSUED")]
    Issued,
    Invoiced,
    Settled,
    CancelledWithFee,
    CancelledNoFee,
    Voided,
}

impl SupplierStatus {
    /// Lenient parse for rows read back from the store.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Confirmed" => Some(SupplierStatus::Confirmed),
            "ISSUED" => Some(SupplierStatus::Issued),
            "Invoiced" => Some(SupplierStatus::Invoiced),
            "Settled" => Some(SupplierStatus::Settled),
            "CancelledWithFee" => Some(SupplierStatus::CancelledWithFee),
            "CancelledNoFee" => Some(SupplierStatus::CancelledNoFee),
            "Voided" => Some(SupplierStatus::Voided),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupplierStatus::Confirmed => "Confirmed",
            SupplierStatus::Issued => "ISSUED",
            SupplierStatus::Invoiced => "Invoiced",
            SupplierStatus::Settled => "Settled",
            SupplierStatus::CancelledWithFee => "CancelledWithFee",
            SupplierStatus::CancelledNoFee => "CancelledNoFee",
            SupplierStatus::Voided => "Voided",
        }
    }
}

/// Payment lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Authorized,
    Captured,
    Refunded,
    Settled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Authorized => "Authorized",
            PaymentStatus::Captured => "Captured",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::Settled => "Settled",
        }
    }
}

/// Refund lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Initiated,
    Processing,
    Issued,
    Closed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Initiated => "INITIATED",
            RefundStatus::Processing => "PROCESSING",
            RefundStatus::Issued => "ISSUED",
            RefundStatus::Closed => "CLOSED",
            RefundStatus::Failed => "FAILED",
        }
    }
}

/// Basis on which a supplier amount was stated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountBasis {
    #[serde(rename = "gross")]
    Gross,
    #[serde(rename = "net")]
    Net,
    #[serde(rename = "redemption-triggered")]
    RedemptionTriggered,
}

impl AmountBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountBasis::Gross => "gross",
            AmountBasis::Net => "net",
            AmountBasis::RedemptionTriggered => "redemption-triggered",
        }
    }
}

/// Canonical projection of the free-string `component_type`.
///
/// Producers may send arbitrary strings; the raw value is kept on the row and
/// this derived column lets reads filter cleanly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalComponentType {
    RoomRate,
    BaseFare,
    Tax,
    Fee,
    Markup,
    Discount,
    Commission,
    Adjustment,
    Other,
}

impl CanonicalComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalComponentType::RoomRate => "room_rate",
            CanonicalComponentType::BaseFare => "base_fare",
            CanonicalComponentType::Tax => "tax",
            CanonicalComponentType::Fee => "fee",
            CanonicalComponentType::Markup => "markup",
            CanonicalComponentType::Discount => "discount",
            CanonicalComponentType::Commission => "commission",
            CanonicalComponentType::Adjustment => "adjustment",
            CanonicalComponentType::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "room_rate" => Some(CanonicalComponentType::RoomRate),
            "base_fare" => Some(CanonicalComponentType::BaseFare),
            "tax" => Some(CanonicalComponentType::Tax),
            "fee" => Some(CanonicalComponentType::Fee),
            "markup" => Some(CanonicalComponentType::Markup),
            "discount" => Some(CanonicalComponentType::Discount),
            "commission" => Some(CanonicalComponentType::Commission),
            "adjustment" => Some(CanonicalComponentType::Adjustment),
            "other" => Some(CanonicalComponentType::Other),
            _ => None,
        }
    }

    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "roomrate" | "room_rate" => CanonicalComponentType::RoomRate,
            "basefare" | "base_fare" => CanonicalComponentType::BaseFare,
            "tax" | "vat" => CanonicalComponentType::Tax,
            "fee" | "servicefee" | "service_fee" => CanonicalComponentType::Fee,
            "markup" => CanonicalComponentType::Markup,
            "discount" | "promo" => CanonicalComponentType::Discount,
            "commission" => CanonicalComponentType::Commission,
            "adjustment" => CanonicalComponentType::Adjustment,
            _ => CanonicalComponentType::Other,
        }
    }
}

/// Typed payment method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fact rows
// ─────────────────────────────────────────────────────────────────────────────

/// One occurrence of a pricing component inside a pricing snapshot.
///
/// Append-only; created once per snapshot occurrence, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingComponentFact {
    /// Primary key: unique across the entire fact store.
    pub component_instance_id: String,
    /// Stable semantic identity; shared across versions/snapshots.
    pub component_semantic_id: String,
    /// Producing event; used for event-level idempotency.
    pub event_id: String,
    pub order_id: OrderId,
    pub pricing_snapshot_id: String,
    pub version: i64,
    pub component_type: String,
    pub canonical_component_type: CanonicalComponentType,
    /// Signed, minor units. Negative for refund components.
    pub amount: i64,
    pub currency: String,
    /// Canonicalized flat map (keys sorted, empties dropped).
    pub dimensions: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_refund: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_of_component_semantic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter_service: Option<String>,
    pub emitted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// One payment lifecycle event on an order's payment timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTimelineFact {
    /// Primary key.
    pub event_id: String,
    pub order_id: OrderId,
    pub timeline_version: i64,
    pub status: String,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_amount: Option<i64>,
    /// Amount captured by this specific event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_amount: Option<i64>,
    /// Running total across captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_amount_total: Option<i64>,
    pub currency: String,
    /// Canonicalized typed instrument, if the producer sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter_service: Option<String>,
    pub emitted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// One supplier lifecycle event for a payable instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierTimelineFact {
    /// Primary key.
    pub event_id: String,
    pub order_id: OrderId,
    pub order_detail_id: OrderDetailId,
    pub supplier_id: String,
    pub supplier_reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_code: Option<String>,
    /// `None` = booking level; partitions payables within the order line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_instance_id: Option<String>,
    pub supplier_timeline_version: i64,
    pub status: String,
    /// Amount due on this event's basis, minor units.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_basis: Option<String>,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_context: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_context: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter_service: Option<String>,
    pub emitted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl SupplierTimelineFact {
    pub fn fulfillment_key(&self) -> FulfillmentKey {
        FulfillmentKey::from_option(self.fulfillment_instance_id.as_deref())
    }

    pub fn status_enum(&self) -> Option<SupplierStatus> {
        SupplierStatus::parse(&self.status)
    }
}

/// One obligation line of a multi-party payable breakdown.
///
/// Lines created with a supplier event carry that event's version; standalone
/// partner adjustments carry [`crate::version::STANDALONE_VERSION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierPayableLine {
    /// Primary key.
    pub line_id: String,
    pub event_id: String,
    pub order_id: OrderId,
    pub order_detail_id: OrderDetailId,
    pub supplier_reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_instance_id: Option<String>,
    pub supplier_timeline_version: i64,
    pub party_type: PartyType,
    pub party_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_name: Option<String>,
    pub obligation_type: String,
    /// Unsigned magnitude; direction lives in `amount_effect`.
    pub amount: i64,
    pub amount_effect: AmountEffect,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

impl SupplierPayableLine {
    pub fn fulfillment_key(&self) -> FulfillmentKey {
        FulfillmentKey::from_option(self.fulfillment_instance_id.as_deref())
    }

    /// Signed contribution of this line to the payable total.
    pub fn signed_amount(&self) -> i64 {
        self.amount * self.amount_effect.sign()
    }
}

/// One refund lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundTimelineFact {
    /// Primary key.
    pub event_id: String,
    pub order_id: OrderId,
    pub refund_id: RefundId,
    pub refund_timeline_version: i64,
    pub status: String,
    pub refund_amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter_service: Option<String>,
    pub emitted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// A parked event that failed validation or persistence.
///
/// Carries the verbatim raw payload so the event can be replayed after
/// remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Primary key.
    pub dlq_id: String,
    /// Best-effort extraction from the raw payload, for filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    /// Verbatim inbound payload.
    pub raw_event: JsonValue,
    pub error_kind: ErrorKind,
    pub error_detail: String,
    pub received_at: DateTime<Utc>,
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_effect_signs() {
        assert_eq!(AmountEffect::IncreasesPayable.sign(), 1);
        assert_eq!(AmountEffect::DecreasesPayable.sign(), -1);
    }

    #[test]
    fn amount_effect_wire_names() {
        assert_eq!(
            serde_json::to_string(&AmountEffect::IncreasesPayable).unwrap(),
            "\"INCREASES_PAYABLE\""
        );
        let parsed: AmountEffect = serde_json::from_str("\"DECREASES_PAYABLE\"").unwrap();
        assert_eq!(parsed, AmountEffect::DecreasesPayable);
    }

    #[test]
    fn supplier_status_roundtrips_wire_names() {
        for raw in [
            "Confirmed",
            "ISSUED",
            "Invoiced",
            "Settled",
            "CancelledWithFee",
            "CancelledNoFee",
            "Voided",
        ] {
            let status = SupplierStatus::parse(raw).unwrap();
            assert_eq!(status.as_str(), raw);
        }
        assert_eq!(SupplierStatus::parse("SomethingNew"), None);
    }

    #[test]
    fn canonical_component_type_projects_known_strings() {
        assert_eq!(
            CanonicalComponentType::from_raw("RoomRate"),
            CanonicalComponentType::RoomRate
        );
        assert_eq!(
            CanonicalComponentType::from_raw("VAT"),
            CanonicalComponentType::Tax
        );
        assert_eq!(
            CanonicalComponentType::from_raw("LoyaltyBoost"),
            CanonicalComponentType::Other
        );
    }

    #[test]
    fn amount_basis_wire_names() {
        let parsed: AmountBasis = serde_json::from_str("\"redemption-triggered\"").unwrap();
        assert_eq!(parsed, AmountBasis::RedemptionTriggered);
        assert_eq!(
            serde_json::to_string(&AmountBasis::Gross).unwrap(),
            "\"gross\""
        );
    }
}
