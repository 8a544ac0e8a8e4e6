//! Observability: tracing/logging setup for UPRL services.

mod tracing_init;

pub use tracing_init::init;
