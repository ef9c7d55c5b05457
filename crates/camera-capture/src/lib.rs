//! Camera Capture Library for the Sky Camera Server
//!
//! Wraps a single astronomy camera behind the small synchronous
//! [`CameraDevice`] capability interface consumed by the exposure controller.
//! Provides:
//! - ZWO ASI SDK bindings (`asi-sdk` feature)
//! - A simulated sensor for development and tests

#[cfg(feature = "asi-sdk")]
pub mod ffi;
pub mod frame;
pub mod sensor;
pub mod simulated;

pub use frame::RawFrame;
pub use sensor::{BayerPattern, ControlRange, SensorInfo};
pub use simulated::{SimulatedBehavior, SimulatedCamera, SimulatedConfig, SimulatedControl};

#[cfg(feature = "asi-sdk")]
pub use ffi::AsiCamera;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera not found: {0}")]
    NotFound(String),

    #[error("Failed to set {control}: {message}")]
    Control { control: String, message: String },

    #[error("Camera rejected exposure: {0}")]
    Rejected(String),

    #[error("Exposure failed: {0}")]
    Capture(String),

    #[error("Image download failed: {0}")]
    Download(String),

    #[error("Camera disconnected")]
    Disconnected,

    #[error("Camera not open")]
    NotOpen,

    #[error("Camera call did not return within {0:?}")]
    Timeout(Duration),

    #[error("Camera worker unavailable: {0}")]
    Unavailable(String),
}

/// How to pick the physical camera on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraIdentifier {
    /// Position in the SDK's enumeration order
    Index(u32),
    /// Model name, with or without the vendor prefix
    Model(String),
}

impl Default for CameraIdentifier {
    fn default() -> Self {
        CameraIdentifier::Index(0)
    }
}

impl CameraIdentifier {
    /// Check whether a reported model name matches this identifier
    pub fn matches_model(&self, name: &str) -> bool {
        match self {
            CameraIdentifier::Index(_) => false,
            CameraIdentifier::Model(model) => {
                name == model || name.strip_prefix("ZWO ") == Some(model.as_str())
            }
        }
    }
}

/// Per-exposure sensor settings applied before capture begins
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub gain: i64,
    pub offset: i64,
    /// White balance red, applied only when set
    pub wb_r: Option<i64>,
    /// White balance blue, applied only when set
    pub wb_b: Option<i64>,
}

/// Hardware exposure status as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// No exposure running
    Idle,
    /// Integration or readout in progress
    Working,
    /// Frame is ready to download
    Success,
    /// The device aborted the exposure
    Failed,
}

/// Synchronous capability interface over one physical camera.
///
/// Every call may block on the device and every call may fail. Callers are
/// expected to serialize access; implementations are not required to be
/// reentrant.
pub trait CameraDevice: Send + 'static {
    /// Open the camera and describe the sensor
    fn open(&mut self) -> Result<SensorInfo, CameraError>;

    /// Apply per-exposure settings (ROI reset, gain, offset, white balance)
    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CameraError>;

    /// Start an exposure; returns once the device accepted the command
    fn begin_capture(&mut self, exposure: Duration, is_dark: bool) -> Result<(), CameraError>;

    /// Query the hardware exposure status without blocking on the exposure
    fn poll_capture(&mut self) -> Result<CaptureStatus, CameraError>;

    /// Download the frame of a successful exposure
    fn read_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Abort a running exposure
    fn abort(&mut self) -> Result<(), CameraError>;

    /// Release the device
    fn close(&mut self) -> Result<(), CameraError>;
}

impl<D: CameraDevice + ?Sized> CameraDevice for Box<D> {
    fn open(&mut self) -> Result<SensorInfo, CameraError> {
        (**self).open()
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CameraError> {
        (**self).configure(settings)
    }

    fn begin_capture(&mut self, exposure: Duration, is_dark: bool) -> Result<(), CameraError> {
        (**self).begin_capture(exposure, is_dark)
    }

    fn poll_capture(&mut self) -> Result<CaptureStatus, CameraError> {
        (**self).poll_capture()
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        (**self).read_frame()
    }

    fn abort(&mut self) -> Result<(), CameraError> {
        (**self).abort()
    }

    fn close(&mut self) -> Result<(), CameraError> {
        (**self).close()
    }
}
