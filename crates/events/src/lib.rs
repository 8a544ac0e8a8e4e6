//! `uprl-events` — inbound event schema.
//!
//! This crate defines the **wire contract** between producer services and
//! the Core: the versioned envelope, the event-kind routing table, and one
//! typed body per schema version. Legacy shapes (flat payment fields, single
//! `detail_context`) are lifted to the current form here, *before*
//! validation, so the ingestion pipeline only ever sees canonical bodies.

pub mod adjustment;
pub mod envelope;
pub mod kind;
pub mod payment;
pub mod pricing;
pub mod refund;
pub mod supplier;

pub use adjustment::PartnerAdjustmentBody;
pub use envelope::{EventEnvelope, ParseError};
pub use kind::{EventKind, SchemaVersion};
pub use payment::{Instrument, Payment, PaymentLifecycleBody};
pub use pricing::{DetailContext, FxContext, PricingComponent, PricingUpdatedBody, Totals};
pub use refund::{RefundIssuedBody, RefundLifecycleBody};
pub use supplier::{Cancellation, ObligationLine, Party, SupplierLifecycleBody, SupplierPayload};
