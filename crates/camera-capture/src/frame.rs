//! Raw sensor frame types

use crate::CameraError;

/// Raw frame downloaded from the sensor.
///
/// Pixels are stored row-major. 16-bit frames hold little-endian `u16`
/// samples, 8-bit frames hold one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Pixel bytes (width * height * bytes_per_pixel)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Bits per stored sample (8 or 16)
    pub bit_depth: u8,
}

impl RawFrame {
    /// Create a frame, checking the buffer length against the geometry
    pub fn new(data: Vec<u8>, width: u32, height: u32, bit_depth: u8) -> Result<Self, CameraError> {
        if bit_depth != 8 && bit_depth != 16 {
            return Err(CameraError::Download(format!(
                "unsupported bit depth {}",
                bit_depth
            )));
        }

        let expected = Self::buffer_len(width, height, bit_depth);
        if data.len() != expected {
            return Err(CameraError::Download(format!(
                "buffer is {} bytes, expected {} for {}x{} @ {} bit",
                data.len(),
                expected,
                width,
                height,
                bit_depth
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            bit_depth,
        })
    }

    /// Buffer size in bytes for the given geometry
    pub fn buffer_len(width: u32, height: u32, bit_depth: u8) -> usize {
        width as usize * height as usize * Self::bytes_for_depth(bit_depth)
    }

    fn bytes_for_depth(bit_depth: u8) -> usize {
        if bit_depth > 8 {
            2
        } else {
            1
        }
    }

    /// Bytes used per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        Self::bytes_for_depth(self.bit_depth)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.bytes_per_pixel();
        match self.bytes_per_pixel() {
            2 => Some(u16::from_le_bytes([self.data[idx], self.data[idx + 1]])),
            _ => Some(self.data[idx] as u16),
        }
    }

    /// Iterate samples in row-major order
    pub fn samples(&self) -> impl Iterator<Item = u16> + '_ {
        let step = self.bytes_per_pixel();
        self.data.chunks_exact(step).map(move |chunk| match step {
            2 => u16::from_le_bytes([chunk[0], chunk[1]]),
            _ => chunk[0] as u16,
        })
    }
}
