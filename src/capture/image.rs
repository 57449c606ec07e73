//! Encoded picture produced by a capture session.

use crate::hardware::PictureFormat;
use chrono::{DateTime, Local};

/// Compressed picture bytes exactly as the sensor produced them.
///
/// The core never decodes or re-encodes the payload; it only carries it
/// from the hardware callback to the handoff target.
#[derive(Clone)]
pub struct EncodedImage {
    /// Encoded picture data.
    bytes: Vec<u8>,
    /// Encoding reported by the parameter set in effect.
    format: PictureFormat,
    /// Wall-clock time the payload reached the core.
    captured_at: DateTime<Local>,
}

impl EncodedImage {
    /// Wraps an encoded payload.
    pub fn new(bytes: Vec<u8>, format: PictureFormat) -> Self {
        Self {
            bytes,
            format,
            captured_at: Local::now(),
        }
    }

    /// Returns the payload.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the image and returns the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn format(&self) -> PictureFormat {
        self.format
    }

    #[inline]
    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Checks for JPEG start and end markers.
    pub fn looks_like_jpeg(&self) -> bool {
        self.bytes.len() >= 4
            && self.bytes.starts_with(&[0xFF, 0xD8])
            && self.bytes.ends_with(&[0xFF, 0xD9])
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_markers() {
        let image = EncodedImage::new(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], PictureFormat::Jpeg);
        assert!(image.looks_like_jpeg());
        assert_eq!(image.len(), 5);

        let raw = EncodedImage::new(vec![0u8; 16], PictureFormat::Nv21);
        assert!(!raw.looks_like_jpeg());
    }

    #[test]
    fn test_debug_omits_payload() {
        let image = EncodedImage::new(vec![7u8; 1024], PictureFormat::Jpeg);
        let debug = format!("{:?}", image);
        assert!(debug.contains("bytes: 1024"));
        assert!(!debug.contains("7, 7"));
    }
}
