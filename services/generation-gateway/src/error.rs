//! HTTP error responses
//!
//! Pool degradation is not an error: a fallback answer is still a 200.
//! Only invalid input and provider failures the pool chose to propagate
//! reach the client as errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provider::ProviderError;
use thiserror::Error;

/// Request-level failures rendered as JSON error bodies.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pool(#[from] key_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pool(key_pool::Error::Provider {
                source: ProviderError::Timeout(_),
                ..
            }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Pool(key_pool::Error::NoCredentials) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pool(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Pool(_) => "provider_error",
        }
    }

    /// Attach the request id and render.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

/// Build a JSON error response.
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}
