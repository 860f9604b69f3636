//! JSON error responses for the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qr_core::error::QrError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "bad_request", message: msg.into() }
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "not_found", message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<QrError> for ApiError {
    fn from(err: QrError) -> Self {
        let status = match &err {
            QrError::UnknownTier(_) => StatusCode::NOT_FOUND,
            QrError::Config(_) | QrError::Toml(_) | QrError::Serialization(_) => StatusCode::BAD_REQUEST,
            QrError::QuotaExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            QrError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            QrError::Backend { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, code: err.code(), message: err.to_string() }
    }
}
