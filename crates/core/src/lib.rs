//! Core domain for the Unified Pricing Read Layer.
//!
//! This crate defines **domain vocabulary**, not infrastructure.
//! Fact rows are intended to be **immutable**, **versioned**, and
//! **append-only**; everything that writes or reads them lives in
//! `uprl-infra`.

pub mod error;
pub mod facts;
pub mod id;
pub mod identity;
pub mod version;

pub use error::{DomainError, DomainResult, ErrorKind};
pub use facts::{
    AmountBasis, AmountEffect, CanonicalComponentType, DlqEntry, PartyType, PaymentMethod,
    PaymentStatus, PaymentTimelineFact, PricingComponentFact, RefundStatus, RefundTimelineFact,
    SupplierPayableLine, SupplierStatus, SupplierTimelineFact,
};
pub use id::{OrderDetailId, OrderId, RefundId};
pub use identity::{canonical_dimensions, instance_id, semantic_id, IdentityError};
pub use version::{FulfillmentKey, VersionFamily, VersionScope, BOOKING_LEVEL_KEY, STANDALONE_VERSION};
