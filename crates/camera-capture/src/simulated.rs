//! Simulated camera for development and tests
//!
//! Behaves like a polled SDK camera: an exposure stays `Working` until its
//! duration has elapsed, then reports the outcome selected through
//! [`SimulatedControl`].

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{
    BayerPattern, CameraDevice, CameraError, CaptureSettings, CaptureStatus, ControlRange,
    RawFrame, SensorInfo,
};

/// Simulated sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Reported model name
    pub name: String,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Stored sample depth (8 or 16)
    pub bit_depth: u8,
    /// Report an RGGB colour sensor
    pub color: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            name: "Simulated ASI".to_string(),
            width: 1280,
            height: 960,
            bit_depth: 16,
            color: false,
        }
    }
}

impl SimulatedConfig {
    /// Small sensor for unit tests
    pub fn tiny() -> Self {
        Self {
            width: 16,
            height: 8,
            ..Default::default()
        }
    }
}

/// Outcome the simulated hardware produces for the next exposures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedBehavior {
    /// Complete once the exposure time has elapsed
    Complete,
    /// Stay in `Working` forever
    Hang,
    /// Report a failed exposure once the time has elapsed
    FailExposure,
    /// Refuse to start the exposure
    RejectBegin,
    /// Drop off the bus while exposing
    Disconnect,
    /// Fail the image download
    FailDownload,
}

#[derive(Debug)]
struct ControlState {
    behavior: SimulatedBehavior,
    abort_fails: bool,
    force_complete: bool,
    settings: Option<CaptureSettings>,
    begin_calls: u32,
    abort_calls: u32,
}

/// Shared handle for steering a [`SimulatedCamera`] from outside
#[derive(Debug, Clone)]
pub struct SimulatedControl {
    state: Arc<Mutex<ControlState>>,
}

impl SimulatedControl {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState {
                behavior: SimulatedBehavior::Complete,
                abort_fails: false,
                force_complete: false,
                settings: None,
                begin_calls: 0,
                abort_calls: 0,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControlState>, CameraError> {
        self.state
            .lock()
            .map_err(|e| CameraError::Unavailable(format!("Lock error: {}", e)))
    }

    /// Select the outcome of subsequent exposures
    pub fn set_behavior(&self, behavior: SimulatedBehavior) {
        if let Ok(mut state) = self.lock() {
            state.behavior = behavior;
        }
    }

    /// Make `abort` report an error
    pub fn set_abort_fails(&self, fails: bool) {
        if let Ok(mut state) = self.lock() {
            state.abort_fails = fails;
        }
    }

    /// Finish the running exposure without waiting for its duration
    pub fn complete_now(&self) {
        if let Ok(mut state) = self.lock() {
            state.force_complete = true;
        }
    }

    /// Settings applied by the last `configure`
    pub fn last_settings(&self) -> Option<CaptureSettings> {
        self.lock().ok().and_then(|s| s.settings.clone())
    }

    /// Number of accepted `begin_capture` calls
    pub fn begin_calls(&self) -> u32 {
        self.lock().map(|s| s.begin_calls).unwrap_or(0)
    }

    /// Number of `abort` calls
    pub fn abort_calls(&self) -> u32 {
        self.lock().map(|s| s.abort_calls).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveExposure {
    started: Instant,
    duration: Duration,
}

/// In-memory camera implementing [`CameraDevice`]
pub struct SimulatedCamera {
    config: SimulatedConfig,
    control: SimulatedControl,
    open: bool,
    active: Option<ActiveExposure>,
    ready: bool,
}

impl SimulatedCamera {
    /// Create a simulated camera and its control handle
    pub fn new(config: SimulatedConfig) -> (Self, SimulatedControl) {
        let control = SimulatedControl::new();
        let camera = Self {
            config,
            control: control.clone(),
            open: false,
            active: None,
            ready: false,
        };
        (camera, control)
    }

    /// Deterministic test pattern produced for the given settings
    pub fn synthesize(config: &SimulatedConfig, settings: &CaptureSettings) -> Vec<u8> {
        let pixels = config.width as usize * config.height as usize;
        let base = settings.offset.max(0) as u32 * 16;
        let mut data = Vec::with_capacity(RawFrame::buffer_len(
            config.width,
            config.height,
            config.bit_depth,
        ));

        for i in 0..pixels {
            let value = base + ((i as u32 * 7 + settings.gain.max(0) as u32) % 4096);
            if config.bit_depth > 8 {
                data.extend_from_slice(&(value.min(u16::MAX as u32) as u16).to_le_bytes());
            } else {
                data.push((value % 256) as u8);
            }
        }
        data
    }

    fn sensor_info(&self) -> SensorInfo {
        let (bayer, wb_r, wb_b) = if self.config.color {
            (
                Some(BayerPattern::Rggb),
                Some(ControlRange::new(1, 99, 52)),
                Some(ControlRange::new(1, 99, 95)),
            )
        } else {
            (None, None, None)
        };

        SensorInfo {
            name: self.config.name.clone(),
            max_width: self.config.width,
            max_height: self.config.height,
            bit_depth: self.config.bit_depth.max(8),
            bayer,
            pixel_size_um: 3.76,
            gain: ControlRange::new(0, 600, 120),
            offset: ControlRange::new(0, 100, 10),
            exposure_us: ControlRange::new(32, 2_000_000_000, 10_000),
            wb_r,
            wb_b,
        }
    }

    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::NotOpen)
        }
    }
}

impl CameraDevice for SimulatedCamera {
    fn open(&mut self) -> Result<SensorInfo, CameraError> {
        info!(
            "Opening simulated camera {} ({}x{})",
            self.config.name, self.config.width, self.config.height
        );
        self.open = true;
        self.active = None;
        self.ready = false;
        Ok(self.sensor_info())
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CameraError> {
        self.ensure_open()?;
        let mut state = self.control.lock()?;
        state.settings = Some(settings.clone());
        debug!("Simulated camera configured: {:?}", settings);
        Ok(())
    }

    fn begin_capture(&mut self, exposure: Duration, _is_dark: bool) -> Result<(), CameraError> {
        self.ensure_open()?;
        let mut state = self.control.lock()?;
        if state.behavior == SimulatedBehavior::RejectBegin {
            return Err(CameraError::Rejected("simulated rejection".to_string()));
        }
        if self.active.is_some() {
            return Err(CameraError::Rejected("exposure in progress".to_string()));
        }

        state.begin_calls += 1;
        state.force_complete = false;
        self.ready = false;
        self.active = Some(ActiveExposure {
            started: Instant::now(),
            duration: exposure,
        });
        Ok(())
    }

    fn poll_capture(&mut self) -> Result<CaptureStatus, CameraError> {
        self.ensure_open()?;
        let Some(active) = self.active else {
            return Ok(if self.ready {
                CaptureStatus::Success
            } else {
                CaptureStatus::Idle
            });
        };

        let state = self.control.lock()?;
        let elapsed = state.force_complete || active.started.elapsed() >= active.duration;

        match state.behavior {
            SimulatedBehavior::Hang => Ok(CaptureStatus::Working),
            _ if !elapsed => Ok(CaptureStatus::Working),
            SimulatedBehavior::Disconnect => {
                self.active = None;
                Err(CameraError::Disconnected)
            }
            SimulatedBehavior::FailExposure => {
                self.active = None;
                Ok(CaptureStatus::Failed)
            }
            _ => {
                self.active = None;
                self.ready = true;
                Ok(CaptureStatus::Success)
            }
        }
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        self.ensure_open()?;
        if !self.ready {
            return Err(CameraError::Download("no frame available".to_string()));
        }
        self.ready = false;

        let state = self.control.lock()?;
        if state.behavior == SimulatedBehavior::FailDownload {
            return Err(CameraError::Download("simulated transfer error".to_string()));
        }

        let settings = state.settings.clone().unwrap_or(CaptureSettings {
            gain: 0,
            offset: 0,
            wb_r: None,
            wb_b: None,
        });
        let data = Self::synthesize(&self.config, &settings);
        RawFrame::new(data, self.config.width, self.config.height, self.config.bit_depth)
    }

    fn abort(&mut self) -> Result<(), CameraError> {
        let mut state = self.control.lock()?;
        state.abort_calls += 1;
        if state.abort_fails {
            return Err(CameraError::Capture("simulated abort failure".to_string()));
        }
        self.active = None;
        self.ready = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        info!("Closing simulated camera {}", self.config.name);
        self.open = false;
        self.active = None;
        self.ready = false;
        Ok(())
    }
}
