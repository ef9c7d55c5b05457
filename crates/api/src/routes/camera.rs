//! Camera Routes
//!
//! Thin adapters over the exposure controller. Handlers never block on the
//! device except for the hand-off inside `start_exposure`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use exposure_control::{ErrorKind, ExposureRecord, ExposureRequest, ExposureStarted, ExposureState};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: ExposureState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<ExposureRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ExposureRecord> for StatusResponse {
    fn from(record: ExposureRecord) -> Self {
        let (error, error_kind) = match record.error {
            Some(info) => (Some(info.message), Some(info.kind)),
            None => (None, None),
        };
        Self {
            status: record.state,
            error,
            error_kind,
            sequence: record.sequence,
            request: record.request,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

/// Start an exposure
pub async fn expose(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExposureRequest>, JsonRejection>,
) -> Result<Json<ExposureStarted>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let started = state.controller.start_exposure(request).await?;
    Ok(Json(started))
}

/// Current exposure status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(state.controller.get_status().into())
}

/// Download the last image as FITS
pub async fn image(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let image = state.controller.get_image()?;

    let fits = tokio::task::spawn_blocking(move || image.to_fits())
        .await
        .map_err(|e| ApiError::Encoding(e.to_string()))?
        .map_err(|e| ApiError::Encoding(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, fits.len().to_string()),
        ],
        fits,
    )
        .into_response())
}
