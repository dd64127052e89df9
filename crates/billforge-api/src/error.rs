//! Maps the core `Error` onto an HTTP response via its own `status_code()`
//! classification (§6) — the API layer does no re-classification of its own.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use billforge_core::Error;
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({"error": self.0.category(), "message": self.0.to_string()}));
        (status, body).into_response()
    }
}
