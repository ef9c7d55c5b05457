//! Result cache holding the most recent completed image

use camera_capture::{BayerPattern, RawFrame};
use chrono::{DateTime, Local, Utc};
use fits_writer::{FitsError, Header, ImageData};
use std::sync::Arc;

use crate::ExposureRequest;

const FITS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Longest instrument name that still fits a card with every quote doubled
const MAX_INSTRUMENT_CHARS: usize = 32;

/// A completed exposure: pixels plus the metadata that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    /// Sequence of the exposure that produced this image
    pub sequence: u64,
    /// Pixel buffer and geometry as handed up by the device
    pub frame: RawFrame,
    /// Parameters of the exposure
    pub request: ExposureRequest,
    /// Camera model name
    pub instrument: String,
    /// Colour filter layout, `None` for mono sensors
    pub bayer: Option<BayerPattern>,
    /// Start of integration
    pub started_at: DateTime<Utc>,
    /// Time the frame reached the cache
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn pixel_buffer(&self) -> &[u8] {
        &self.frame.data
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn bit_depth(&self) -> u8 {
        self.frame.bit_depth
    }

    /// Observation header cards
    pub fn fits_header(&self) -> Result<Header, FitsError> {
        let mut header = Header::new();
        let image_type = if self.request.is_dark { "DARK" } else { "LIGHT" };
        let local = self.started_at.with_timezone(&Local);

        header.push("IMAGETYP", image_type, "Type of exposure")?;
        header.push("INSTRUME", header_text(&self.instrument), "Imaging instrument name")?;
        header.push("EXPOSURE", self.request.exposure_seconds, "[s] Exposure time")?;
        header.push("EXPTIME", self.request.exposure_seconds, "[s] Exposure time")?;
        header.push(
            "DATE-OBS",
            self.started_at.format(FITS_TIME_FORMAT).to_string(),
            "Time of observation (UTC)",
        )?;
        header.push(
            "DATE-LOC",
            local.format(FITS_TIME_FORMAT).to_string(),
            "Time of observation (Local)",
        )?;
        header.push("GAIN", self.request.gain, "Sensor gain")?;
        header.push("OFFSET", self.request.offset, "Sensor offset")?;
        if let Some(bayer) = self.bayer {
            header.push("BAYERPAT", bayer.as_str(), "Bayer pattern")?;
            header.push("COLORTYP", bayer.as_str(), "Bayer pattern")?;
        }
        Ok(header)
    }

    /// Encode as a FITS file
    pub fn to_fits(&self) -> Result<Vec<u8>, FitsError> {
        let header = self.fits_header()?;
        fits_writer::encode_image(
            &header,
            &ImageData {
                width: self.frame.width,
                height: self.frame.height,
                bit_depth: self.frame.bit_depth,
                data: &self.frame.data,
            },
        )
    }
}

/// Device-reported names may carry bytes a FITS header cannot hold
fn header_text(name: &str) -> String {
    name.chars()
        .take(MAX_INSTRUMENT_CHARS)
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect()
}

/// Holder for the latest image.
///
/// The image is swapped as a whole; readers keep their `Arc` after the cache
/// moves on, so a download never sees a half-replaced buffer.
#[derive(Debug, Default)]
pub struct ResultCache {
    image: Option<Arc<CapturedImage>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached image
    pub fn publish(&mut self, image: CapturedImage) -> Arc<CapturedImage> {
        let image = Arc::new(image);
        self.image = Some(image.clone());
        image
    }

    /// Drop the cached image; returns whether one was present
    pub fn clear(&mut self) -> bool {
        self.image.take().is_some()
    }

    pub fn snapshot(&self) -> Option<Arc<CapturedImage>> {
        self.image.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }
}
