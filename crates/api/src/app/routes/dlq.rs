//! DLQ inspection endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use uprl_core::{ErrorKind, OrderId};
use uprl_infra::DlqFilter;

use crate::app::{errors, AppServices};

#[derive(Debug, Deserialize)]
pub struct DlqQuery {
    pub error_kind: Option<String>,
    pub order_id: Option<String>,
    pub limit: Option<usize>,
}

pub fn router() -> Router {
    Router::new().route("/", get(list_dlq))
}

/// GET /dlq?error_kind=VALIDATION&order_id=ORD-1&limit=50
pub async fn list_dlq(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<DlqQuery>,
) -> axum::response::Response {
    let error_kind = match query.error_kind.as_deref() {
        None => None,
        Some(raw) => match ErrorKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_error_kind",
                    format!("unknown error_kind '{raw}'"),
                )
            }
        },
    };

    let filter = DlqFilter {
        error_kind,
        order_id: query.order_id.map(OrderId::new),
        limit: query.limit,
    };

    match services.store.list_dlq(filter).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}
