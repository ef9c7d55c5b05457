//! Sensor description reported when the camera is opened

use serde::{Deserialize, Serialize};

/// Colour filter array layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BayerPattern {
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

impl BayerPattern {
    /// Map the vendor's numeric pattern code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BayerPattern::Rggb),
            1 => Some(BayerPattern::Bggr),
            2 => Some(BayerPattern::Grbg),
            3 => Some(BayerPattern::Gbrg),
            _ => None,
        }
    }

    /// Name used in FITS headers
    pub fn as_str(&self) -> &'static str {
        match self {
            BayerPattern::Rggb => "RGGB",
            BayerPattern::Bggr => "BGGR",
            BayerPattern::Grbg => "GRBG",
            BayerPattern::Gbrg => "GBRG",
        }
    }
}

/// Inclusive range advertised for a writable control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRange {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

impl ControlRange {
    pub fn new(min: i64, max: i64, default: i64) -> Self {
        Self { min, max, default }
    }

    /// Check if a value lies within the range
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Static description of the opened sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Model name as reported by the SDK
    pub name: String,
    /// Full-frame width
    pub max_width: u32,
    /// Full-frame height
    pub max_height: u32,
    /// ADC bit depth
    pub bit_depth: u8,
    /// Bayer layout for colour sensors, `None` for mono
    pub bayer: Option<BayerPattern>,
    /// Pixel pitch in micrometres
    pub pixel_size_um: f64,
    /// Gain control range
    pub gain: ControlRange,
    /// Offset (black level) control range
    pub offset: ControlRange,
    /// Exposure control range (microseconds)
    pub exposure_us: ControlRange,
    /// White balance red, colour sensors only
    pub wb_r: Option<ControlRange>,
    /// White balance blue, colour sensors only
    pub wb_b: Option<ControlRange>,
}

impl SensorInfo {
    /// Check if the sensor has a colour filter array
    pub fn is_color(&self) -> bool {
        self.bayer.is_some()
    }
}
