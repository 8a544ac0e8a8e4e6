//! Order read endpoints: unified view, effective payables, per-family
//! history.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use uprl_core::OrderId;
use uprl_infra::VersionRange;

use crate::app::{errors, AppServices};

// ─────────────────────────────────────────────────────────────────────────────
// Query parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Inclusive version bounds for history reads.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl HistoryQuery {
    fn range(&self) -> VersionRange {
        VersionRange {
            from: self.from,
            to: self.to,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/:order_id", get(get_order))
        .route("/:order_id/payables", get(get_payables))
        .route("/:order_id/pricing/history", get(pricing_history))
        .route("/:order_id/payments/history", get(payment_history))
        .route("/:order_id/suppliers/history", get(supplier_history))
        .route("/:order_id/refunds/history", get(refund_history))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /orders — every order id known to any fact table.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store.order_ids().await {
        Ok(ids) => Json(ids).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id — the unified latest-state view.
pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.views.get_order(&order_id).await {
        Ok(view) => {
            if view.pricing_latest.is_empty()
                && view.payment_latest.is_none()
                && view.supplier_latest.is_empty()
                && view.refund_latest.is_empty()
            {
                return errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("no facts recorded for order {order_id}"),
                );
            }
            Json(view).into_response()
        }
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id/payables — effective payable instances.
pub async fn get_payables(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.projector.effective_payables(&order_id).await {
        Ok(payables) => Json(payables).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id/pricing/history?from=&to= — per-version rollups.
pub async fn pricing_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.views.pricing_history(&order_id, query.range()).await {
        Ok(history) => Json(history).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id/payments/history?from=&to= — raw timeline rows.
pub async fn payment_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.store.payment_timeline(&order_id, query.range()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id/suppliers/history?from=&to= — raw timeline rows.
pub async fn supplier_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.store.supplier_timeline(&order_id, query.range()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /orders/:order_id/refunds/history?from=&to= — raw timeline rows.
pub async fn refund_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let order_id = OrderId::new(order_id);
    match services.store.refund_timeline(&order_id, query.range()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}
