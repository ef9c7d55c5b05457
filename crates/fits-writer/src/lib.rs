//! Minimal FITS Writer
//!
//! Encodes a single 2-D image as a FITS primary HDU. Supports 8-bit unsigned
//! data (`BITPIX = 8`) and 16-bit unsigned data stored as signed integers with
//! `BZERO = 32768`. Header and data units are padded to 2880-byte blocks.

use thiserror::Error;

/// FITS logical record size
pub const BLOCK_SIZE: usize = 2880;

/// Header card size
pub const CARD_SIZE: usize = 80;

/// Keywords written by the encoder itself
const RESERVED: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "BZERO", "BSCALE", "END",
];

/// FITS encoding errors
#[derive(Debug, Error, PartialEq)]
pub enum FitsError {
    #[error("Invalid keyword {0:?}")]
    InvalidKeyword(String),

    #[error("Keyword {0} is written by the encoder")]
    ReservedKeyword(String),

    #[error("Value for {0} does not fit in a header card")]
    CardTooLong(String),

    #[error("Value for {0} is not a finite number")]
    NonFinite(String),

    #[error("Text for {0} contains characters outside printable ASCII")]
    InvalidText(String),

    #[error("Unsupported bit depth {0}")]
    UnsupportedBitDepth(u8),

    #[error("Image buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Header value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Logical(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Keyword / value / comment triple
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Value,
    pub comment: Option<String>,
}

impl Card {
    /// Render as an 80-character record
    fn render(&self) -> Result<String, FitsError> {
        let text_ok = match &self.value {
            Value::Text(v) => is_printable_ascii(v),
            _ => true,
        };
        if !text_ok || !self.comment.as_deref().map_or(true, is_printable_ascii) {
            return Err(FitsError::InvalidText(self.keyword.clone()));
        }

        let value = format_value(&self.keyword, &self.value)?;
        let mut card = format!("{:<8}= {}", self.keyword, value);
        if card.len() > CARD_SIZE {
            return Err(FitsError::CardTooLong(self.keyword.clone()));
        }

        if let Some(comment) = &self.comment {
            card.push_str(" / ");
            card.push_str(comment);
            // Comments are truncated rather than rejected
            card.truncate(CARD_SIZE);
        }

        Ok(format!("{:<80}", card))
    }
}

/// Header text is restricted to ASCII 0x20..=0x7E
fn is_printable_ascii(text: &str) -> bool {
    text.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn format_value(keyword: &str, value: &Value) -> Result<String, FitsError> {
    Ok(match value {
        Value::Logical(v) => format!("{:>20}", if *v { "T" } else { "F" }),
        Value::Integer(v) => format!("{:>20}", v),
        Value::Float(v) => format!("{:>20}", format_float(keyword, *v)?),
        Value::Text(v) => {
            let escaped = v.replace('\'', "''");
            format!("'{:<8}'", escaped)
        }
    })
}

fn format_float(keyword: &str, v: f64) -> Result<String, FitsError> {
    if !v.is_finite() {
        return Err(FitsError::NonFinite(keyword.to_string()));
    }

    let plain = format!("{}", v);
    if plain.len() <= 20 {
        return Ok(if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        });
    }

    // Exponent form needs a decimal point in the mantissa
    let exp = format!("{:E}", v);
    Ok(match exp.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{}.0E{}", mantissa, exponent)
        }
        _ => exp,
    })
}

fn validate_keyword(keyword: &str) -> Result<(), FitsError> {
    let valid = !keyword.is_empty()
        && keyword.len() <= 8
        && keyword
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(FitsError::InvalidKeyword(keyword.to_string()));
    }
    if RESERVED.contains(&keyword) {
        return Err(FitsError::ReservedKeyword(keyword.to_string()));
    }
    Ok(())
}

/// User header cards, written after the mandatory keywords
#[derive(Debug, Clone, Default)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card
    pub fn push(
        &mut self,
        keyword: &str,
        value: impl Into<Value>,
        comment: &str,
    ) -> Result<(), FitsError> {
        validate_keyword(keyword)?;
        let card = Card {
            keyword: keyword.to_string(),
            value: value.into(),
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        };
        // Render once so bad values fail at insertion time
        card.render()?;
        self.cards.push(card);
        Ok(())
    }

    /// Look up a card value by keyword
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

/// Borrowed image pixels
#[derive(Debug, Clone, Copy)]
pub struct ImageData<'a> {
    pub width: u32,
    pub height: u32,
    /// 8 or 16
    pub bit_depth: u8,
    /// Row-major samples; little-endian `u16` when `bit_depth` is 16
    pub data: &'a [u8],
}

/// Encode an image and header as a complete FITS file
pub fn encode_image(header: &Header, image: &ImageData<'_>) -> Result<Vec<u8>, FitsError> {
    let bytes_per_pixel = match image.bit_depth {
        8 => 1,
        16 => 2,
        other => return Err(FitsError::UnsupportedBitDepth(other)),
    };
    let expected = image.width as usize * image.height as usize * bytes_per_pixel;
    if image.data.len() != expected {
        return Err(FitsError::BufferSize {
            expected,
            actual: image.data.len(),
        });
    }

    let mut cards = vec![
        Card {
            keyword: "SIMPLE".into(),
            value: Value::Logical(true),
            comment: Some("conforms to FITS standard".into()),
        },
        Card {
            keyword: "BITPIX".into(),
            value: Value::Integer(image.bit_depth as i64),
            comment: Some("array data type".into()),
        },
        Card {
            keyword: "NAXIS".into(),
            value: Value::Integer(2),
            comment: Some("number of array dimensions".into()),
        },
        Card {
            keyword: "NAXIS1".into(),
            value: Value::Integer(image.width as i64),
            comment: None,
        },
        Card {
            keyword: "NAXIS2".into(),
            value: Value::Integer(image.height as i64),
            comment: None,
        },
        Card {
            keyword: "EXTEND".into(),
            value: Value::Logical(true),
            comment: None,
        },
    ];
    if bytes_per_pixel == 2 {
        cards.push(Card {
            keyword: "BZERO".into(),
            value: Value::Integer(32768),
            comment: Some("offset data range to that of unsigned short".into()),
        });
        cards.push(Card {
            keyword: "BSCALE".into(),
            value: Value::Integer(1),
            comment: Some("default scaling factor".into()),
        });
    }
    cards.extend(header.cards.iter().cloned());

    let mut out = Vec::with_capacity(padded_len((cards.len() + 1) * CARD_SIZE) + padded_len(expected));
    for card in &cards {
        out.extend_from_slice(card.render()?.as_bytes());
    }
    out.extend_from_slice(format!("{:<80}", "END").as_bytes());
    out.resize(padded_len(out.len()), b' ');

    let data_start = out.len();
    if bytes_per_pixel == 2 {
        // Unsigned -> signed with BZERO 32768 is a flip of the top bit
        for chunk in image.data.chunks_exact(2) {
            let v = u16::from_le_bytes([chunk[0], chunk[1]]) ^ 0x8000;
            out.extend_from_slice(&v.to_be_bytes());
        }
    } else {
        out.extend_from_slice(image.data);
    }
    let data_len = out.len() - data_start;
    out.resize(data_start + padded_len(data_len), 0);

    Ok(out)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cards_of(fits: &[u8]) -> Vec<String> {
        fits.chunks(CARD_SIZE)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .take_while(|c| !c.starts_with("END "))
            .collect()
    }

    #[test]
    fn test_card_layout() {
        let card = Card {
            keyword: "EXPTIME".into(),
            value: Value::Float(3.0),
            comment: Some("[s] Exposure time".into()),
        };
        let rendered = card.render().unwrap();
        assert_eq!(rendered.len(), 80);
        assert_eq!(&rendered[..10], "EXPTIME = ");
        // Fixed format: numeric values end in column 30
        assert_eq!(&rendered[27..30], "3.0");
        assert!(rendered.contains(" / [s] Exposure time"));
    }

    #[test]
    fn test_string_values_are_quoted_and_escaped() {
        let card = Card {
            keyword: "INSTRUME".into(),
            value: Value::Text("O'Neil".into()),
            comment: None,
        };
        let rendered = card.render().unwrap();
        assert!(rendered.starts_with("INSTRUME= 'O''Neil '"));

        let short = Card {
            keyword: "IMAGETYP".into(),
            value: Value::Text("DARK".into()),
            comment: None,
        };
        assert!(short.render().unwrap().starts_with("IMAGETYP= 'DARK    '"));
    }

    #[test]
    fn test_float_formats() {
        assert_eq!(format_float("X", 5.0).unwrap(), "5.0");
        assert_eq!(format_float("X", 0.25).unwrap(), "0.25");
        assert_eq!(format_float("X", 1e-30).unwrap(), "1.0E-30");
        assert!(format_float("X", f64::NAN).is_err());
    }

    #[test]
    fn test_keyword_validation() {
        let mut header = Header::new();
        assert!(header.push("DATE-OBS", "2024-01-01T00:00:00", "").is_ok());
        assert_eq!(
            header.push("toolong99", 1i64, ""),
            Err(FitsError::InvalidKeyword("toolong99".into()))
        );
        assert_eq!(
            header.push("BITPIX", 8i64, ""),
            Err(FitsError::ReservedKeyword("BITPIX".into()))
        );
        assert_eq!(header.get("DATE-OBS"), Some(&Value::Text("2024-01-01T00:00:00".into())));
    }

    #[test]
    fn test_oversized_text_is_rejected() {
        let mut header = Header::new();
        let long = "x".repeat(80);
        assert_eq!(
            header.push("OBJECT", long.as_str(), ""),
            Err(FitsError::CardTooLong("OBJECT".into()))
        );
    }

    #[test]
    fn test_non_ascii_text_is_rejected() {
        let mut header = Header::new();
        assert_eq!(
            header.push("INSTRUME", "Kamera \u{dc}", ""),
            Err(FitsError::InvalidText("INSTRUME".into()))
        );
        assert_eq!(
            header.push("GAIN", 50i64, "Verst\u{e4}rkung"),
            Err(FitsError::InvalidText("GAIN".into()))
        );
        assert_eq!(
            header.push("OBJECT", "line\nbreak", ""),
            Err(FitsError::InvalidText("OBJECT".into()))
        );
        assert!(header.cards().is_empty());

        header.push("INSTRUME", "Kamera U", "Imaging instrument").unwrap();
        assert_eq!(header.cards().len(), 1);
    }

    #[test]
    fn test_encode_16bit_image() {
        let mut header = Header::new();
        header.push("GAIN", 50i64, "Sensor gain").unwrap();

        // 2x2 image: 0, 1, 32768, 65535
        let samples: [u16; 4] = [0, 1, 32768, 65535];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let image = ImageData {
            width: 2,
            height: 2,
            bit_depth: 16,
            data: &data,
        };

        let fits = encode_image(&header, &image).unwrap();
        assert_eq!(fits.len(), 2 * BLOCK_SIZE);

        let cards = cards_of(&fits);
        assert!(cards[0].starts_with("SIMPLE  =                    T"));
        assert!(cards[1].starts_with("BITPIX  =                   16"));
        assert!(cards.iter().any(|c| c.starts_with("BZERO   =                32768")));
        assert!(cards.iter().any(|c| c.starts_with("GAIN    =                   50")));

        let body = &fits[BLOCK_SIZE..BLOCK_SIZE + 8];
        assert_eq!(body, &[0x80, 0x00, 0x80, 0x01, 0x00, 0x00, 0x7F, 0xFF]);
        assert!(fits[BLOCK_SIZE + 8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_8bit_image_has_no_bzero() {
        let data = [1u8, 2, 3];
        let image = ImageData {
            width: 3,
            height: 1,
            bit_depth: 8,
            data: &data,
        };
        let fits = encode_image(&Header::new(), &image).unwrap();
        assert!(!cards_of(&fits).iter().any(|c| c.starts_with("BZERO")));
        assert_eq!(&fits[BLOCK_SIZE..BLOCK_SIZE + 3], &data);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let data = [0u8; 5];
        let image = ImageData {
            width: 2,
            height: 2,
            bit_depth: 16,
            data: &data,
        };
        assert_eq!(
            encode_image(&Header::new(), &image),
            Err(FitsError::BufferSize {
                expected: 8,
                actual: 5
            })
        );
    }

    proptest! {
        #[test]
        fn prop_output_is_block_aligned(width in 1u32..64, height in 1u32..64, cards in 0usize..60) {
            let mut header = Header::new();
            for i in 0..cards {
                header.push(&format!("KEY{}", i), i as i64, "filler").unwrap();
            }
            let data = vec![0u8; width as usize * height as usize * 2];
            let image = ImageData { width, height, bit_depth: 16, data: &data };
            let fits = encode_image(&header, &image).unwrap();
            prop_assert_eq!(fits.len() % BLOCK_SIZE, 0);
        }
    }
}
