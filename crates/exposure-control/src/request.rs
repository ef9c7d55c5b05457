//! Exposure request and validation against sensor limits

use camera_capture::{CaptureSettings, ControlRange, SensorInfo};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ExposureError;

/// Parameters of one exposure, immutable once accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRequest {
    /// Integration time in seconds
    #[serde(rename = "exposure")]
    pub exposure_seconds: f64,
    /// Sensor analog gain
    pub gain: i64,
    /// Black level offset
    pub offset: i64,
    /// Keep the shutter closed (dark frame)
    #[serde(default)]
    pub is_dark: bool,
    /// White balance red, colour sensors only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wb_r: Option<i64>,
    /// White balance blue, colour sensors only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wb_b: Option<i64>,
}

impl ExposureRequest {
    /// Create a light-frame request
    pub fn new(exposure_seconds: f64, gain: i64, offset: i64) -> Self {
        Self {
            exposure_seconds,
            gain,
            offset,
            is_dark: false,
            wb_r: None,
            wb_b: None,
        }
    }

    /// Mark as a dark frame
    pub fn dark(mut self) -> Self {
        self.is_dark = true;
        self
    }

    /// Exposure time as a duration
    pub fn duration(&self) -> Result<Duration, ExposureError> {
        Duration::try_from_secs_f64(self.exposure_seconds).map_err(|_| {
            ExposureError::InvalidParameters(format!(
                "exposure {} is not a valid duration",
                self.exposure_seconds
            ))
        })
    }

    /// Device settings for this request
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            gain: self.gain,
            offset: self.offset,
            wb_r: self.wb_r,
            wb_b: self.wb_b,
        }
    }
}

/// Device-advertised bounds a request must satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureLimits {
    pub gain: ControlRange,
    pub offset: ControlRange,
    /// Exposure bounds in microseconds; an upper bound of 0 means unknown
    pub exposure_us: ControlRange,
    pub wb_r: Option<ControlRange>,
    pub wb_b: Option<ControlRange>,
}

impl From<&SensorInfo> for ExposureLimits {
    fn from(sensor: &SensorInfo) -> Self {
        Self {
            gain: sensor.gain,
            offset: sensor.offset,
            exposure_us: sensor.exposure_us,
            wb_r: sensor.wb_r,
            wb_b: sensor.wb_b,
        }
    }
}

impl ExposureLimits {
    /// Check a request against the limits.
    ///
    /// Pure: never looks at controller state.
    pub fn validate(&self, request: &ExposureRequest) -> Result<(), ExposureError> {
        let exposure = request.exposure_seconds;
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(ExposureError::InvalidParameters(format!(
                "exposure must be a positive number of seconds, got {}",
                exposure
            )));
        }
        if self.exposure_us.max > 0 && exposure * 1e6 > self.exposure_us.max as f64 {
            return Err(ExposureError::InvalidParameters(format!(
                "exposure {}s exceeds the device maximum of {}s",
                exposure,
                self.exposure_us.max as f64 / 1e6
            )));
        }

        check_range("gain", request.gain, &self.gain)?;
        check_range("offset", request.offset, &self.offset)?;
        check_optional("wb_r", request.wb_r, self.wb_r.as_ref())?;
        check_optional("wb_b", request.wb_b, self.wb_b.as_ref())?;
        Ok(())
    }
}

fn check_range(name: &str, value: i64, range: &ControlRange) -> Result<(), ExposureError> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(ExposureError::InvalidParameters(format!(
            "{} {} outside [{}, {}]",
            name, value, range.min, range.max
        )))
    }
}

fn check_optional(
    name: &str,
    value: Option<i64>,
    range: Option<&ControlRange>,
) -> Result<(), ExposureError> {
    match (value, range) {
        (None, _) => Ok(()),
        (Some(v), Some(range)) => check_range(name, v, range),
        (Some(_), None) => Err(ExposureError::InvalidParameters(format!(
            "{} is not supported by this camera",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limits() -> ExposureLimits {
        ExposureLimits {
            gain: ControlRange::new(0, 600, 120),
            offset: ControlRange::new(0, 100, 10),
            exposure_us: ControlRange::new(32, 2_000_000_000, 10_000),
            wb_r: None,
            wb_b: None,
        }
    }

    #[test]
    fn test_accepts_typical_request() {
        assert!(limits().validate(&ExposureRequest::new(3.0, 50, 10)).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_exposure() {
        for exposure in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let result = limits().validate(&ExposureRequest::new(exposure, 50, 10));
            assert!(matches!(result, Err(ExposureError::InvalidParameters(_))));
        }
    }

    #[test]
    fn test_rejects_exposure_above_device_maximum() {
        let result = limits().validate(&ExposureRequest::new(2001.0, 50, 10));
        assert!(matches!(result, Err(ExposureError::InvalidParameters(_))));
    }

    #[test]
    fn test_rejects_out_of_range_controls() {
        assert!(limits().validate(&ExposureRequest::new(1.0, 601, 10)).is_err());
        assert!(limits().validate(&ExposureRequest::new(1.0, 50, -1)).is_err());
    }

    #[test]
    fn test_white_balance_requires_support() {
        let mut request = ExposureRequest::new(1.0, 50, 10);
        request.wb_r = Some(52);
        assert!(limits().validate(&request).is_err());

        let color = ExposureLimits {
            wb_r: Some(ControlRange::new(1, 99, 52)),
            wb_b: Some(ControlRange::new(1, 99, 95)),
            ..limits()
        };
        assert!(color.validate(&request).is_ok());
        request.wb_b = Some(100);
        assert!(color.validate(&request).is_err());
    }

    #[test]
    fn test_request_wire_names() {
        let request: ExposureRequest =
            serde_json::from_str(r#"{"exposure": 3.0, "gain": 50, "offset": 10}"#).unwrap();
        assert_eq!(request, ExposureRequest::new(3.0, 50, 10));
        assert!(!request.is_dark);
    }

    proptest! {
        #[test]
        fn prop_in_range_requests_validate(
            exposure in 0.001f64..2000.0,
            gain in 0i64..=600,
            offset in 0i64..=100,
        ) {
            let request = ExposureRequest::new(exposure, gain, offset);
            prop_assert!(limits().validate(&request).is_ok());
            prop_assert!(request.duration().is_ok());
        }

        #[test]
        fn prop_non_positive_exposure_never_validates(exposure in -1e6f64..=0.0) {
            let request = ExposureRequest::new(exposure, 50, 10);
            prop_assert!(limits().validate(&request).is_err());
        }
    }
}
