use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use uprl_infra::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match &err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg.clone()),
        StoreError::Constraint(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "constraint_violation", msg.clone())
        }
        StoreError::Serialization(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", msg.clone())
        }
        StoreError::Unavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg.clone())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
