//! Fingerprint image structures

use std::fmt;

use as608_core::constants::{IMAGE_HEIGHT, IMAGE_SIZE, IMAGE_WIDTH};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Raw image uploaded from the module's image buffer, one byte per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintImage {
    /// Width in pixels
    pub width: usize,

    /// Height in pixels
    pub height: usize,

    /// Row-major pixel data
    pub pixels: Bytes,

    /// When the transfer completed
    pub captured_at: DateTime<Utc>,
}

impl FingerprintImage {
    /// Wrap a reassembled image buffer
    pub fn new(pixels: Bytes) -> Result<Self> {
        if pixels.len() != IMAGE_SIZE {
            return Err(Error::Validation(format!(
                "image must be {} bytes, got {}",
                IMAGE_SIZE,
                pixels.len()
            )));
        }

        Ok(Self {
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
            pixels,
            captured_at: Utc::now(),
        })
    }

    /// Value of pixel (x, y)
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Encode as a binary PGM (P5) file
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }
}

impl fmt::Display for FingerprintImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Image[{}x{}, captured {}]",
            self.width,
            self.height,
            self.captured_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
