//! Read-side projections (derived views over the fact store).
//!
//! Projections are **pure**: identical fact rows yield identical output, and
//! nothing here writes. They are recomputed per read; the fact store is the
//! only source of truth.

pub mod order_view;
pub mod payables;

pub use order_view::{LatestStateViews, OrderReadModel, PricingVersionSummary};
pub use payables::{project_payables, PayableInstance, PayablesProjector, ProjectedObligation};
