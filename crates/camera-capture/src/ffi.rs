//! FFI bindings for the ZWO ASI camera SDK (libASICamera2)

use libc::{c_char, c_int, c_long, c_uchar};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    BayerPattern, CameraDevice, CameraError, CameraIdentifier, CaptureSettings, CaptureStatus,
    ControlRange, RawFrame, SensorInfo,
};

/// ASI_ERROR_CODE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsiErrorCode {
    Success,
    InvalidIndex,
    InvalidId,
    InvalidControlType,
    CameraClosed,
    CameraRemoved,
    InvalidPath,
    InvalidFileFormat,
    InvalidSize,
    InvalidImageType,
    OutOfBoundary,
    Timeout,
    InvalidSequence,
    BufferTooSmall,
    VideoModeActive,
    ExposureInProgress,
    GeneralError,
    InvalidMode,
    Unknown(c_int),
}

impl From<c_int> for AsiErrorCode {
    fn from(code: c_int) -> Self {
        match code {
            0 => AsiErrorCode::Success,
            1 => AsiErrorCode::InvalidIndex,
            2 => AsiErrorCode::InvalidId,
            3 => AsiErrorCode::InvalidControlType,
            4 => AsiErrorCode::CameraClosed,
            5 => AsiErrorCode::CameraRemoved,
            6 => AsiErrorCode::InvalidPath,
            7 => AsiErrorCode::InvalidFileFormat,
            8 => AsiErrorCode::InvalidSize,
            9 => AsiErrorCode::InvalidImageType,
            10 => AsiErrorCode::OutOfBoundary,
            11 => AsiErrorCode::Timeout,
            12 => AsiErrorCode::InvalidSequence,
            13 => AsiErrorCode::BufferTooSmall,
            14 => AsiErrorCode::VideoModeActive,
            15 => AsiErrorCode::ExposureInProgress,
            16 => AsiErrorCode::GeneralError,
            17 => AsiErrorCode::InvalidMode,
            other => AsiErrorCode::Unknown(other),
        }
    }
}

/// ASI_CONTROL_TYPE values used by the adapter
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsiControlType {
    Gain = 0,
    Exposure = 1,
    WbR = 3,
    WbB = 4,
    Offset = 5,
}

/// ASI_IMG_TYPE
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum AsiImageType {
    Raw8 = 0,
    Rgb24 = 1,
    Raw16 = 2,
    Y8 = 3,
}

/// ASI_EXPOSURE_STATUS
const ASI_EXP_IDLE: c_int = 0;
const ASI_EXP_WORKING: c_int = 1;
const ASI_EXP_SUCCESS: c_int = 2;

/// ASI_CAMERA_INFO (matches ASICamera2.h)
#[repr(C)]
pub struct CAsiCameraInfo {
    pub name: [c_char; 64],
    pub camera_id: c_int,
    pub max_height: c_long,
    pub max_width: c_long,
    pub is_color_cam: c_int,
    pub bayer_pattern: c_int,
    pub supported_bins: [c_int; 16],
    pub supported_video_format: [c_int; 8],
    pub pixel_size: f64,
    pub mechanical_shutter: c_int,
    pub st4_port: c_int,
    pub is_cooler_cam: c_int,
    pub is_usb3_host: c_int,
    pub is_usb3_camera: c_int,
    pub elec_per_adu: f32,
    pub bit_depth: c_int,
    pub is_trigger_cam: c_int,
    pub unused: [c_char; 16],
}

/// ASI_CONTROL_CAPS (matches ASICamera2.h)
#[repr(C)]
pub struct CAsiControlCaps {
    pub name: [c_char; 64],
    pub description: [c_char; 128],
    pub max_value: c_long,
    pub min_value: c_long,
    pub default_value: c_long,
    pub is_auto_supported: c_int,
    pub is_writable: c_int,
    pub control_type: c_int,
    pub unused: [c_char; 32],
}

extern "C" {
    fn ASIGetNumOfConnectedCameras() -> c_int;
    fn ASIGetCameraProperty(info: *mut CAsiCameraInfo, camera_index: c_int) -> c_int;
    fn ASIGetCameraPropertyByID(camera_id: c_int, info: *mut CAsiCameraInfo) -> c_int;
    fn ASIOpenCamera(camera_id: c_int) -> c_int;
    fn ASIInitCamera(camera_id: c_int) -> c_int;
    fn ASICloseCamera(camera_id: c_int) -> c_int;
    fn ASIGetNumOfControls(camera_id: c_int, count: *mut c_int) -> c_int;
    fn ASIGetControlCaps(camera_id: c_int, index: c_int, caps: *mut CAsiControlCaps) -> c_int;
    fn ASISetControlValue(camera_id: c_int, control: c_int, value: c_long, auto: c_int) -> c_int;
    fn ASISetROIFormat(camera_id: c_int, width: c_int, height: c_int, bin: c_int, img_type: c_int) -> c_int;
    fn ASISetStartPos(camera_id: c_int, x: c_int, y: c_int) -> c_int;
    fn ASIStartExposure(camera_id: c_int, is_dark: c_int) -> c_int;
    fn ASIStopExposure(camera_id: c_int) -> c_int;
    fn ASIGetExpStatus(camera_id: c_int, status: *mut c_int) -> c_int;
    fn ASIGetDataAfterExp(camera_id: c_int, buffer: *mut c_uchar, size: c_long) -> c_int;
    fn ASIStopVideoCapture(camera_id: c_int) -> c_int;
    fn ASIDisableDarkSubtract(camera_id: c_int) -> c_int;
}

fn check(ret: c_int, what: &str) -> Result<(), CameraError> {
    match AsiErrorCode::from(ret) {
        AsiErrorCode::Success => Ok(()),
        AsiErrorCode::CameraRemoved => Err(CameraError::Disconnected),
        AsiErrorCode::CameraClosed => Err(CameraError::NotOpen),
        code => Err(CameraError::Capture(format!("{} failed: {:?}", what, code))),
    }
}

/// Decode a fixed-size name field, which may lack a NUL terminator
fn c_name(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn camera_property(index: c_int) -> Result<CAsiCameraInfo, CameraError> {
    // SAFETY: CAsiCameraInfo is plain old data; the SDK fills it in
    let mut info: CAsiCameraInfo = unsafe { std::mem::zeroed() };
    check(unsafe { ASIGetCameraProperty(&mut info, index) }, "ASIGetCameraProperty")?;
    Ok(info)
}

fn camera_property_by_id(camera_id: c_int) -> Result<CAsiCameraInfo, CameraError> {
    // SAFETY: as above
    let mut info: CAsiCameraInfo = unsafe { std::mem::zeroed() };
    check(
        unsafe { ASIGetCameraPropertyByID(camera_id, &mut info) },
        "ASIGetCameraPropertyByID",
    )?;
    Ok(info)
}

/// ZWO ASI camera driver wrapper
pub struct AsiCamera {
    camera_id: c_int,
    opened: bool,
    width: u32,
    height: u32,
}

impl AsiCamera {
    /// Resolve a camera on the bus.
    ///
    /// The SDK requires the connected-camera count to be queried before any
    /// index is valid.
    pub fn find(identifier: &CameraIdentifier) -> Result<Self, CameraError> {
        let count = unsafe { ASIGetNumOfConnectedCameras() };
        info!("{} ASI camera(s) connected", count);

        let index = match identifier {
            CameraIdentifier::Index(index) => {
                let index = *index as c_int;
                if index < 0 || index >= count {
                    return Err(CameraError::NotFound(format!(
                        "Invalid camera id {}, {} cameras found",
                        index, count
                    )));
                }
                index
            }
            CameraIdentifier::Model(model) => (0..count)
                .find(|&i| {
                    camera_property(i)
                        .map(|info| identifier.matches_model(&c_name(&info.name)))
                        .unwrap_or(false)
                })
                .ok_or_else(|| CameraError::NotFound(format!("Could not find camera model {}", model)))?,
        };

        let info = camera_property(index)?;
        Ok(Self {
            camera_id: info.camera_id,
            opened: false,
            width: info.max_width as u32,
            height: info.max_height as u32,
        })
    }

    fn control_caps(&self) -> Result<Vec<CAsiControlCaps>, CameraError> {
        let mut count: c_int = 0;
        check(
            unsafe { ASIGetNumOfControls(self.camera_id, &mut count) },
            "ASIGetNumOfControls",
        )?;

        let mut caps = Vec::with_capacity(count.max(0) as usize);
        for i in 0..count {
            // SAFETY: plain old data filled by the SDK
            let mut cap: CAsiControlCaps = unsafe { std::mem::zeroed() };
            check(
                unsafe { ASIGetControlCaps(self.camera_id, i, &mut cap) },
                "ASIGetControlCaps",
            )?;
            caps.push(cap);
        }
        Ok(caps)
    }

    fn set_control(&self, control: AsiControlType, value: i64) -> Result<(), CameraError> {
        let ret = unsafe { ASISetControlValue(self.camera_id, control as c_int, value as c_long, 0) };
        check(ret, "ASISetControlValue").map_err(|e| match e {
            CameraError::Capture(message) => CameraError::Control {
                control: format!("{:?}", control),
                message,
            },
            other => other,
        })
    }

    fn reset_roi(&mut self) -> Result<(), CameraError> {
        let info = camera_property_by_id(self.camera_id)?;
        // Width must be a multiple of 8, height a multiple of 2
        let width = (info.max_width as u32) & !7;
        let height = (info.max_height as u32) & !1;

        check(
            unsafe {
                ASISetROIFormat(
                    self.camera_id,
                    width as c_int,
                    height as c_int,
                    1,
                    AsiImageType::Raw16 as c_int,
                )
            },
            "ASISetROIFormat",
        )?;
        check(unsafe { ASISetStartPos(self.camera_id, 0, 0) }, "ASISetStartPos")?;

        self.width = width;
        self.height = height;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.opened {
            Ok(())
        } else {
            Err(CameraError::NotOpen)
        }
    }
}

impl CameraDevice for AsiCamera {
    fn open(&mut self) -> Result<SensorInfo, CameraError> {
        let opened = check(unsafe { ASIOpenCamera(self.camera_id) }, "ASIOpenCamera")
            .and_then(|_| check(unsafe { ASIInitCamera(self.camera_id) }, "ASIInitCamera"));
        if let Err(e) = opened {
            unsafe { ASICloseCamera(self.camera_id) };
            return Err(CameraError::Open(e.to_string()));
        }
        self.opened = true;

        check(
            unsafe { ASIDisableDarkSubtract(self.camera_id) },
            "ASIDisableDarkSubtract",
        )?;
        // Leftover video or exposure from a previous process is not an error
        if let Err(e) = check(unsafe { ASIStopVideoCapture(self.camera_id) }, "ASIStopVideoCapture") {
            debug!("Ignoring {}", e);
        }
        if let Err(e) = check(unsafe { ASIStopExposure(self.camera_id) }, "ASIStopExposure") {
            debug!("Ignoring {}", e);
        }

        let info = camera_property_by_id(self.camera_id)?;
        let mut sensor = SensorInfo {
            name: c_name(&info.name),
            max_width: info.max_width as u32,
            max_height: info.max_height as u32,
            bit_depth: info.bit_depth as u8,
            bayer: if info.is_color_cam != 0 {
                BayerPattern::from_code(info.bayer_pattern)
            } else {
                None
            },
            pixel_size_um: info.pixel_size,
            gain: ControlRange::new(0, 0, 0),
            offset: ControlRange::new(0, 0, 0),
            exposure_us: ControlRange::new(0, 0, 0),
            wb_r: None,
            wb_b: None,
        };

        for cap in self.control_caps()? {
            let range = ControlRange::new(
                cap.min_value as i64,
                cap.max_value as i64,
                cap.default_value as i64,
            );
            match cap.control_type {
                t if t == AsiControlType::Gain as c_int => sensor.gain = range,
                t if t == AsiControlType::Offset as c_int => sensor.offset = range,
                t if t == AsiControlType::Exposure as c_int => sensor.exposure_us = range,
                t if t == AsiControlType::WbR as c_int => sensor.wb_r = Some(range),
                t if t == AsiControlType::WbB as c_int => sensor.wb_b = Some(range),
                _ => {}
            }
        }

        info!(
            "Opened {} ({}x{}, {} bit)",
            sensor.name, sensor.max_width, sensor.max_height, sensor.bit_depth
        );
        Ok(sensor)
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.reset_roi()?;
        self.set_control(AsiControlType::Gain, settings.gain)?;
        self.set_control(AsiControlType::Offset, settings.offset)?;
        if let Some(wb_r) = settings.wb_r {
            self.set_control(AsiControlType::WbR, wb_r)?;
        }
        if let Some(wb_b) = settings.wb_b {
            self.set_control(AsiControlType::WbB, wb_b)?;
        }
        Ok(())
    }

    fn begin_capture(&mut self, exposure: Duration, is_dark: bool) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.set_control(AsiControlType::Exposure, exposure.as_micros() as i64)?;
        check(
            unsafe { ASIStartExposure(self.camera_id, if is_dark { 1 } else { 0 }) },
            "ASIStartExposure",
        )
        .map_err(|e| match e {
            CameraError::Capture(message) => CameraError::Rejected(message),
            other => other,
        })
    }

    fn poll_capture(&mut self) -> Result<CaptureStatus, CameraError> {
        self.ensure_open()?;
        let mut status: c_int = 0;
        check(
            unsafe { ASIGetExpStatus(self.camera_id, &mut status) },
            "ASIGetExpStatus",
        )?;
        Ok(match status {
            ASI_EXP_IDLE => CaptureStatus::Idle,
            ASI_EXP_WORKING => CaptureStatus::Working,
            ASI_EXP_SUCCESS => CaptureStatus::Success,
            _ => CaptureStatus::Failed,
        })
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        self.ensure_open()?;
        let mut buffer = vec![0u8; RawFrame::buffer_len(self.width, self.height, 16)];
        let ret = unsafe {
            ASIGetDataAfterExp(self.camera_id, buffer.as_mut_ptr(), buffer.len() as c_long)
        };
        check(ret, "ASIGetDataAfterExp").map_err(|e| match e {
            CameraError::Capture(message) => CameraError::Download(message),
            other => other,
        })?;
        RawFrame::new(buffer, self.width, self.height, 16)
    }

    fn abort(&mut self) -> Result<(), CameraError> {
        check(unsafe { ASIStopExposure(self.camera_id) }, "ASIStopExposure")
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        check(unsafe { ASICloseCamera(self.camera_id) }, "ASICloseCamera")
    }
}

impl Drop for AsiCamera {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close ASI camera {}: {}", self.camera_id, e);
        }
    }
}
