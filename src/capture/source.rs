//! Frame source abstraction and capture errors.

use thiserror::Error;

use super::frame::Frame;

/// Errors that can occur while producing frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Stream not started")]
    NotStreaming,

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Frame data is {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that produces frames on demand.
///
/// A failed read is never fatal to the caller: the acquisition loop logs it
/// and tries again on its next iteration.
pub trait FrameSource: Send {
    /// Whether the source is open and able to deliver a frame.
    fn is_ready(&self) -> bool;

    /// Read one frame. Must not block for longer than a bounded interval.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

impl CaptureError {
    /// A miss the loop expects to recover from on its own: the stream is
    /// not running or the device had no frame within the read timeout.
    pub fn is_transient(&self) -> bool {
        match self {
            CaptureError::NotStreaming => true,
            CaptureError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
