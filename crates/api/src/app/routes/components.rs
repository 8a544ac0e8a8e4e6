//! Component lineage endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new().route("/:semantic_id/lineage", get(get_lineage))
}

/// GET /components/:semantic_id/lineage
///
/// Original occurrences of a semantic component across versions, plus the
/// refund components that point back at it.
pub async fn get_lineage(
    Extension(services): Extension<Arc<AppServices>>,
    Path(semantic_id): Path<String>,
) -> axum::response::Response {
    match services.store.component_lineage(&semantic_id).await {
        Ok(lineage) => {
            if lineage.original.is_empty() && lineage.refunds.is_empty() {
                return errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("no component recorded with semantic id '{semantic_id}'"),
                );
            }
            Json(lineage).into_response()
        }
        Err(err) => errors::store_error_to_response(err),
    }
}
