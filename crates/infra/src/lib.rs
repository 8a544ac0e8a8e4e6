//! Infrastructure layer: fact store, version registry, ingestion pipeline,
//! read-side projections.
//!
//! The fact store is the only mutable shared resource in the Core; everything
//! on the read side (projector, latest-state views) is stateless and derives
//! its answers from store reads on demand.

pub mod fact_store;
pub mod pipeline;
pub mod projections;
pub mod version_registry;

#[cfg(test)]
mod integration_tests;

pub use fact_store::{
    CommitOutcome, ComponentLineage, DlqFilter, FactBatch, FactStore, InMemoryFactStore,
    PostgresFactStore, StoreError, VersionRange,
};
pub use pipeline::{IngestOutcome, IngestionPipeline, PipelineConfig};
pub use projections::{
    LatestStateViews, OrderReadModel, PayableInstance, PayablesProjector, PricingVersionSummary,
    ProjectedObligation,
};
pub use version_registry::{ScopeLocks, VersionRegistry};
