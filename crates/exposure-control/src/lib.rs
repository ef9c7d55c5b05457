//! Exposure Control
//!
//! Owns the camera handle, serializes capture requests through a single
//! active-exposure slot and publishes consistent status and image snapshots
//! to concurrent readers.
//!
//! ```text
//! Idle ──start──▶ Exposing ──success──▶ Ready
//!   ▲                 │                   │
//!   │                 └──fault/timeout──▶ Failed
//!   └── Ready | Failed ──start──▶ Exposing
//! ```

mod cache;
mod controller;
mod device;
pub mod metrics;
mod request;
mod state;

pub use cache::{CapturedImage, ResultCache};
pub use controller::{ControllerConfig, ControllerSnapshot, ExposureController, ExposureStarted};
pub use request::{ExposureLimits, ExposureRequest};
pub use state::{ErrorInfo, ExposureRecord, ExposureState};

use camera_capture::CameraError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classification of exposure errors, stable across the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad request parameters
    Validation,
    /// Another exposure is running
    Busy,
    /// The camera reported a fault
    Device,
    /// No completion within the deadline; the abort succeeded
    Timeout,
    /// No completion within the deadline and the abort failed as well
    AbortFailed,
    /// No image to hand out
    NotReady,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::Device => "device",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AbortFailed => "abort_failed",
            ErrorKind::NotReady => "not_ready",
        }
    }
}

/// Errors returned by controller operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExposureError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Exposure already in progress")]
    Busy,

    #[error("Device error: {0}")]
    Device(#[from] CameraError),

    #[error("Exposure did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Exposure did not complete within {after:?} and abort failed: {reason}")]
    AbortFailed { after: Duration, reason: String },

    #[error("No image available")]
    NotReady,
}

impl ExposureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExposureError::InvalidParameters(_) => ErrorKind::Validation,
            ExposureError::Busy => ErrorKind::Busy,
            ExposureError::Device(_) => ErrorKind::Device,
            ExposureError::Timeout(_) => ErrorKind::Timeout,
            ExposureError::AbortFailed { .. } => ErrorKind::AbortFailed,
            ExposureError::NotReady => ErrorKind::NotReady,
        }
    }
}
