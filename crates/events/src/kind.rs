//! Event kinds and schema-version tokens.
//!
//! Each `schema_version` token maps to exactly one kind; the pipeline routes
//! by kind and rejects kind/version mismatches before any body parsing.

use crate::envelope::ParseError;

/// Routing discriminator of an inbound event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    PricingUpdated,
    PaymentLifecycle,
    SupplierLifecycle,
    RefundIssued,
    RefundLifecycle,
    PartnerAdjustment,
}

impl EventKind {
    /// Parse an `event_type` value. The alias set is exhaustive; anything
    /// else is a validation failure.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw {
            "PricingUpdated" => Ok(EventKind::PricingUpdated),
            "PaymentLifecycle" => Ok(EventKind::PaymentLifecycle),
            "IssuanceSupplierLifecycle" | "SupplierLifecycleEvent" => {
                Ok(EventKind::SupplierLifecycle)
            }
            "refund.issued" => Ok(EventKind::RefundIssued),
            "RefundLifecycle" => Ok(EventKind::RefundLifecycle),
            "PartnerAdjustmentEvent" => Ok(EventKind::PartnerAdjustment),
            other => Err(ParseError::UnknownEventType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PricingUpdated => "PricingUpdated",
            EventKind::PaymentLifecycle => "PaymentLifecycle",
            EventKind::SupplierLifecycle => "IssuanceSupplierLifecycle",
            EventKind::RefundIssued => "refund.issued",
            EventKind::RefundLifecycle => "RefundLifecycle",
            EventKind::PartnerAdjustment => "PartnerAdjustmentEvent",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exhaustive schema-version tokens.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    PricingCommerceV1,
    PaymentTimelineV1,
    SupplierTimelineV1,
    /// Adds multi-party obligations and `fulfillment_instance_id`.
    SupplierTimelineV2,
    RefundComponentsV1,
    RefundLifecycleV1,
    PartnerAdjustmentV1,
}

impl SchemaVersion {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw {
            "pricing.commerce.v1" => Ok(SchemaVersion::PricingCommerceV1),
            "payment.timeline.v1" => Ok(SchemaVersion::PaymentTimelineV1),
            "supplier.timeline.v1" => Ok(SchemaVersion::SupplierTimelineV1),
            "supplier.timeline.v2" => Ok(SchemaVersion::SupplierTimelineV2),
            "refund.components.v1" => Ok(SchemaVersion::RefundComponentsV1),
            "refund.lifecycle.v1" => Ok(SchemaVersion::RefundLifecycleV1),
            "partner.adjustment.v1" => Ok(SchemaVersion::PartnerAdjustmentV1),
            other => Err(ParseError::UnknownSchemaVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::PricingCommerceV1 => "pricing.commerce.v1",
            SchemaVersion::PaymentTimelineV1 => "payment.timeline.v1",
            SchemaVersion::SupplierTimelineV1 => "supplier.timeline.v1",
            SchemaVersion::SupplierTimelineV2 => "supplier.timeline.v2",
            SchemaVersion::RefundComponentsV1 => "refund.components.v1",
            SchemaVersion::RefundLifecycleV1 => "refund.lifecycle.v1",
            SchemaVersion::PartnerAdjustmentV1 => "partner.adjustment.v1",
        }
    }

    /// The one kind this token belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            SchemaVersion::PricingCommerceV1 => EventKind::PricingUpdated,
            SchemaVersion::PaymentTimelineV1 => EventKind::PaymentLifecycle,
            SchemaVersion::SupplierTimelineV1 | SchemaVersion::SupplierTimelineV2 => {
                EventKind::SupplierLifecycle
            }
            SchemaVersion::RefundComponentsV1 => EventKind::RefundIssued,
            SchemaVersion::RefundLifecycleV1 => EventKind::RefundLifecycle,
            SchemaVersion::PartnerAdjustmentV1 => EventKind::PartnerAdjustment,
        }
    }
}

impl core::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplier_aliases_route_to_the_same_kind() {
        assert_eq!(
            EventKind::parse("IssuanceSupplierLifecycle").unwrap(),
            EventKind::SupplierLifecycle
        );
        assert_eq!(
            EventKind::parse("SupplierLifecycleEvent").unwrap(),
            EventKind::SupplierLifecycle
        );
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(matches!(
            EventKind::parse("payment.captured"),
            Err(ParseError::UnknownEventType(_))
        ));
    }

    #[test]
    fn every_schema_version_maps_to_exactly_one_kind() {
        for (token, kind) in [
            ("pricing.commerce.v1", EventKind::PricingUpdated),
            ("payment.timeline.v1", EventKind::PaymentLifecycle),
            ("supplier.timeline.v1", EventKind::SupplierLifecycle),
            ("supplier.timeline.v2", EventKind::SupplierLifecycle),
            ("refund.components.v1", EventKind::RefundIssued),
            ("refund.lifecycle.v1", EventKind::RefundLifecycle),
            ("partner.adjustment.v1", EventKind::PartnerAdjustment),
        ] {
            assert_eq!(SchemaVersion::parse(token).unwrap().kind(), kind);
        }
    }
}
