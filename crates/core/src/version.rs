//! Version families and their scope keys.
//!
//! Five **independent** monotonic counters partition the fact store. A
//! version is only meaningful inside its `(family, scope)` pair; the types
//! here exist so a payment version can never be compared against a supplier
//! version by accident.

use serde::{Deserialize, Serialize};

use crate::id::{OrderDetailId, OrderId, RefundId};

/// Version written by standalone partner adjustments. Never assigned by the
/// registry; it marks obligation lines with no timeline parent.
pub const STANDALONE_VERSION: i64 = -1;

/// Sentinel key for booking-level supplier rows (no fulfillment instance).
///
/// The absent value is a meaningful distinct key, not a wildcard: a
/// booking-level row and a redemption row for the same order line are
/// different payable instances.
pub const BOOKING_LEVEL_KEY: &str = "__BOOKING_LEVEL__";

/// One of the five independent version counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionFamily {
    Pricing,
    Payment,
    Supplier,
    Refund,
    /// Reserved for per-detail issuance sequencing; no trigger event yet.
    Issuance,
}

impl VersionFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionFamily::Pricing => "pricing",
            VersionFamily::Payment => "payment",
            VersionFamily::Supplier => "supplier",
            VersionFamily::Refund => "refund",
            VersionFamily::Issuance => "issuance",
        }
    }
}

impl core::fmt::Display for VersionFamily {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key dimension that partitions supplier payables within one order line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FulfillmentKey {
    /// No fulfillment instance: the booking-level row.
    BookingLevel,
    /// A discrete fulfillment instance (e.g. one pass redemption).
    Instance(String),
}

impl FulfillmentKey {
    /// Coalesce an optional column value into the scoping key.
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            Some(v) => FulfillmentKey::Instance(v.to_string()),
            None => FulfillmentKey::BookingLevel,
        }
    }

    /// The key as stored/compared: `COALESCE(fulfillment_instance_id, "__BOOKING_LEVEL__")`.
    pub fn as_key(&self) -> &str {
        match self {
            FulfillmentKey::BookingLevel => BOOKING_LEVEL_KEY,
            FulfillmentKey::Instance(v) => v,
        }
    }

    /// The column value: `None` at booking level.
    pub fn as_column(&self) -> Option<&str> {
        match self {
            FulfillmentKey::BookingLevel => None,
            FulfillmentKey::Instance(v) => Some(v),
        }
    }
}

/// Scope key of one version counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionScope {
    Pricing {
        order_id: OrderId,
    },
    Payment {
        order_id: OrderId,
    },
    Supplier {
        order_id: OrderId,
        order_detail_id: OrderDetailId,
        supplier_reference_id: String,
        fulfillment: FulfillmentKey,
    },
    Refund {
        order_id: OrderId,
        refund_id: RefundId,
    },
    Issuance {
        order_id: OrderId,
        order_detail_id: OrderDetailId,
    },
}

impl VersionScope {
    pub fn family(&self) -> VersionFamily {
        match self {
            VersionScope::Pricing { .. } => VersionFamily::Pricing,
            VersionScope::Payment { .. } => VersionFamily::Payment,
            VersionScope::Supplier { .. } => VersionFamily::Supplier,
            VersionScope::Refund { .. } => VersionFamily::Refund,
            VersionScope::Issuance { .. } => VersionFamily::Issuance,
        }
    }

    /// The order this scope belongs to; shard locks key on this.
    pub fn order_id(&self) -> &OrderId {
        match self {
            VersionScope::Pricing { order_id }
            | VersionScope::Payment { order_id }
            | VersionScope::Supplier { order_id, .. }
            | VersionScope::Refund { order_id, .. }
            | VersionScope::Issuance { order_id, .. } => order_id,
        }
    }
}
