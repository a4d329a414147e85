use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::source::CaptureError;

/// A captured image, immutable once produced.
///
/// Pixel data is shared through `Bytes`, so cloning a frame (for example to
/// hand the most recent one to the display path) never copies pixels.
/// Three-channel frames are stored in the device's native BGR order.
/// Outside this crate frames can only be built through [`Frame::new`],
/// which checks the data length against the geometry.
///
/// ```compile_fail
/// let mut frame = aperture::Frame::empty(0);
/// frame.width = 4;
/// ```
#[derive(Clone)]
pub struct Frame {
    /// Tightly packed rows, `width * channels` bytes each
    pub(crate) data: Bytes,

    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) channels: u8,

    /// Monotonic sequence number assigned by the source
    pub(crate) sequence: u64,

    /// Capture timestamp for latency tracking
    pub(crate) timestamp: Instant,
}

impl Frame {
    /// Build a frame, checking that `data` matches the declared geometry.
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        channels: u8,
        sequence: u64,
    ) -> Result<Self, CaptureError> {
        let data = data.into();
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            channels,
            sequence,
            timestamp: Instant::now(),
        })
    }

    /// A frame with no pixels.
    pub fn empty(sequence: u64) -> Self {
        Self {
            data: Bytes::new(),
            width: 0,
            height: 0,
            channels: 0,
            sequence,
            timestamp: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Pixel formats a device can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_geometry() {
        let frame = Frame::new(vec![0u8; 4 * 2 * 3], 4, 2, 3, 7).unwrap();
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.sequence, 7);
        assert!(!frame.is_empty());

        match Frame::new(vec![0u8; 10], 4, 2, 3, 0) {
            Err(CaptureError::InvalidFrame { expected, actual }) => {
                assert_eq!(expected, 24);
                assert_eq!(actual, 10);
            }
            other => panic!("Expected InvalidFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_frame() {
        assert!(Frame::empty(0).is_empty());
        // Zero-sized geometry with matching (empty) data is still empty
        assert!(Frame::new(Vec::new(), 0, 5, 3, 1).unwrap().is_empty());
    }
}
