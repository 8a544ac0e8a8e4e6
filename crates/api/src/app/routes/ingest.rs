//! Event ingestion endpoint.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::Value as JsonValue;

use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new().route("/", post(ingest_event))
}

/// POST /events
///
/// Accepts one raw producer event. Always 202 when the pipeline ran: the
/// body reports whether the event committed, was a duplicate replay, or was
/// parked in the DLQ. A 5xx means the event could not even be parked.
pub async fn ingest_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(raw): Json<JsonValue>,
) -> axum::response::Response {
    match services.pipeline.ingest(raw).await {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}
