//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exposure_control::{ErrorKind, ExposureError};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Exposure(#[from] ExposureError),

    #[error("Malformed request body: {0}")]
    InvalidBody(String),

    #[error("FITS encoding failed: {0}")]
    Encoding(String),
}

impl ApiError {
    /// Status code, short reason and error kind for the response body
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ApiError::Exposure(e) => {
                let kind = e.kind();
                let (status, reason) = match kind {
                    ErrorKind::Validation => (StatusCode::BAD_REQUEST, "invalid parameters"),
                    ErrorKind::Busy => (StatusCode::CONFLICT, "already exposing"),
                    ErrorKind::NotReady => (StatusCode::NOT_FOUND, "image not ready"),
                    ErrorKind::Device | ErrorKind::Timeout | ErrorKind::AbortFailed => {
                        (StatusCode::SERVICE_UNAVAILABLE, "device error")
                    }
                };
                (status, reason, kind.as_str())
            }
            ApiError::InvalidBody(_) => (
                StatusCode::BAD_REQUEST,
                "invalid parameters",
                ErrorKind::Validation.as_str(),
            ),
            ApiError::Encoding(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error",
                "encoding",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason, kind) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            warn!("Request failed ({}): {}", status, message);
        } else {
            debug!("Request rejected ({}): {}", status, message);
        }

        let body = Json(json!({
            "status": "rejected",
            "reason": reason,
            "error_kind": kind,
            "message": message,
        }));
        (status, body).into_response()
    }
}
