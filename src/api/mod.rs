mod contracts;
pub use contracts::*;

mod error_ring;
pub use error_ring::*;

mod json;
pub use json::*;

mod routes;
pub use routes::*;

mod usecases;
pub use usecases::*;

mod ws;
pub use ws::*;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;

/// Success envelope: `{"status":"ok","data":<payload>}`.
pub fn ok_response(data: serde_json::Value) -> Response {
    Json(json!({"status": "ok", "data": data})).into_response()
}

/// Error envelope with the HTTP status mapped from the error kind.
pub fn error_response(error: GatewayError, message: &str) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "status": "error",
        "error": {
            "code": error.http_code(),
            "message": message,
        },
    });
    (status, Json(body)).into_response()
}
