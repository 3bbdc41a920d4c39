use image::{GrayImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

/// Face-shape categories used to match a user to suitable haircuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Oval,
    Round,
    Square,
    Heart,
    Diamond,
    Oblong,
}

impl FaceShape {
    /// Every face shape, in catalog order.
    pub const ALL: [FaceShape; 6] = [
        FaceShape::Oval,
        FaceShape::Round,
        FaceShape::Square,
        FaceShape::Heart,
        FaceShape::Diamond,
        FaceShape::Oblong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaceShape::Oval => "oval",
            FaceShape::Round => "round",
            FaceShape::Square => "square",
            FaceShape::Heart => "heart",
            FaceShape::Diamond => "diamond",
            FaceShape::Oblong => "oblong",
        }
    }
}

impl fmt::Display for FaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaceShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaceShape::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown face shape: {s}"))
    }
}

/// Classifier output: a face-shape label and an integer confidence percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub face_shape: FaceShape,
    /// Confidence in percent (0–100).
    pub confidence: u8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhotoError {
    #[error("photo is empty")]
    Empty,
    #[error("photo has zero width or height")]
    ZeroDimension,
    #[error("pixel buffer too short: expected {expected} bytes, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode image: {0}")]
    Encode(String),
}

/// A still image handed to the classifier, held fully in memory.
///
/// Constructed either from uploaded file bytes ([`Photo::decode`]) or from a
/// grayscale camera frame ([`Photo::from_luma`]). Both paths guarantee the
/// bytes decode as an image with non-zero dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl Photo {
    /// Validate arbitrary file bytes as an image and wrap them.
    ///
    /// The whole image is decoded, so a valid header over truncated or
    /// corrupt pixel data is rejected. The original encoding is kept.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, PhotoError> {
        if bytes.is_empty() {
            return Err(PhotoError::Empty);
        }

        let reader = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| PhotoError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| PhotoError::Decode("unrecognized image format".into()))?;
        let image = reader
            .decode()
            .map_err(|e| PhotoError::Decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());

        if width == 0 || height == 0 {
            return Err(PhotoError::ZeroDimension);
        }

        tracing::debug!(width, height, format = ?format, bytes = bytes.len(), "decoded photo");

        Ok(Self {
            bytes,
            width,
            height,
            format,
        })
    }

    /// Encode an 8-bit grayscale pixel buffer as a PNG still.
    pub fn from_luma(width: u32, height: u32, mut data: Vec<u8>) -> Result<Self, PhotoError> {
        if width == 0 || height == 0 {
            return Err(PhotoError::ZeroDimension);
        }
        let expected = width as usize * height as usize;
        if data.len() < expected {
            return Err(PhotoError::BufferMismatch {
                expected,
                actual: data.len(),
            });
        }
        data.truncate(expected);

        let img = GrayImage::from_raw(width, height, data).ok_or(PhotoError::BufferMismatch {
            expected,
            actual: 0,
        })?;

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| PhotoError::Encode(e.to_string()))?;

        Ok(Self {
            bytes: out.into_inner(),
            width,
            height,
            format: ImageFormat::Png,
        })
    }

    /// Encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}
