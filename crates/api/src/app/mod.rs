//! Application wiring: services + router.

pub mod errors;
pub mod routes;

use std::sync::Arc;

use axum::{Extension, Router};

use uprl_infra::{FactStore, IngestionPipeline, LatestStateViews, PayablesProjector};

/// Shared service bundle injected into every handler.
pub struct AppServices {
    pub store: Arc<dyn FactStore>,
    pub pipeline: IngestionPipeline,
    pub views: LatestStateViews,
    pub projector: PayablesProjector,
}

impl AppServices {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self {
            pipeline: IngestionPipeline::new(store.clone()),
            views: LatestStateViews::new(store.clone()),
            projector: PayablesProjector::new(store.clone()),
            store,
        }
    }
}

/// Build the full application router.
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .nest("/events", routes::ingest::router())
        .nest("/orders", routes::orders::router())
        .nest("/components", routes::components::router())
        .nest("/dlq", routes::dlq::router())
        .layer(Extension(services))
}
