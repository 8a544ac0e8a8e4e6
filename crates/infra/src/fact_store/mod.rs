//! Fact store implementations (append-only persistence).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryFactStore;
pub use postgres::PostgresFactStore;
pub use r#trait::{
    CommitOutcome, ComponentLineage, DlqFilter, FactBatch, FactStore, StoreError, VersionRange,
};
