use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use webmention_core::Error as CoreError;

/// HTTP-layer wrapper around [`webmention_core::Error`]: maps the core error
/// taxonomy to a status code and a `{"error": "<message>"}` body (spec §6).
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(value: CoreError) -> Self {
        let status = if value.is_client_fault() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %value, "webmention engine error");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
