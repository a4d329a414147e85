//! V4L2 frame source backed by memory-mapped streaming buffers

use std::io;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{
    capture::decoder,
    capture::frame::{Frame, PixelFormat},
    capture::source::{CaptureError, FrameSource},
    CaptureConfig,
};

/// V4L2 capture device
pub struct V4l2Capture {
    device: Device,
    stream: Option<MmapStream<'static>>,
    config: CaptureConfig,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the configured device and negotiate its format
    pub fn new(mut config: CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {:?}", config.device);

        let device = Device::with_path(&config.device.path)?;

        // Query capabilities
        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(
                "device doesn't support video capture".into(),
            ));
        }

        let fourcc = fourcc_for(config.format);
        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc;

        let actual = device.set_format(&fmt)?;
        if actual.fourcc != fourcc {
            return Err(CaptureError::UnsupportedFormat(format!(
                "device refused {:?}, offered {}",
                config.format, actual.fourcc
            )));
        }
        if actual.width != config.width || actual.height != config.height {
            warn!(
                "Device adjusted resolution {}x{} -> {}x{}",
                config.width, config.height, actual.width, actual.height
            );
            config.width = actual.width;
            config.height = actual.height;
        }

        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            warn!("Could not set {} fps: {}", config.fps, e);
        }

        Ok(Self {
            device,
            stream: None,
            config,
            sequence: 0,
        })
    }

    /// Start streaming with memory-mapped buffers
    pub fn start_stream(&mut self) -> Result<(), CaptureError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.config.buffer_count)?;
        stream.set_timeout(Duration::from_millis(self.config.read_timeout_ms));

        self.stream = Some(stream);
        info!(
            "Capture stream started with {} buffers",
            self.config.buffer_count
        );
        Ok(())
    }

    /// Tear the stream down and bring it back up with fresh buffers.
    ///
    /// A failed restart leaves the source closed.
    fn restart_stream(&mut self) {
        // Old buffers must be unmapped before new ones are requested
        self.stream = None;
        match self.start_stream() {
            Ok(()) => debug!("Capture stream restarted"),
            Err(e) => warn!("Capture stream restart failed, source closed: {}", e),
        }
    }

    /// Release the stream; reads become no-ops until restarted
    pub fn stop_stream(&mut self) {
        if self.stream.take().is_some() {
            info!("Capture stream stopped after {} frames", self.sequence);
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl FrameSource for V4l2Capture {
    fn is_ready(&self) -> bool {
        self.stream.is_some()
    }

    #[instrument(skip(self))]
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;

        let decoded = match dequeue(stream, &self.config) {
            Ok(decoded) => decoded,
            Err(CaptureError::Io(e)) if needs_restart(&e) => {
                // The stream requeues its last buffer before every dequeue;
                // after a timeout that buffer is still queued and every later
                // read would fail, so start over.
                self.restart_stream();
                return Err(CaptureError::Io(e));
            }
            Err(e) => return Err(e),
        };

        self.sequence += 1;

        Frame::new(
            decoded.pixels,
            decoded.width,
            decoded.height,
            decoded.channels,
            self.sequence,
        )
    }
}

fn dequeue(
    stream: &mut MmapStream<'static>,
    config: &CaptureConfig,
) -> Result<decoder::Decoded, CaptureError> {
    let (buf, meta) = stream.next()?;
    let used = (meta.bytesused as usize).min(buf.len());
    trace!(bytes = used, "Dequeued buffer");

    decoder::decode(&buf[..used], config.format, config.width, config.height)
}

/// Dequeue failures that leave the stream's buffer bookkeeping out of step
/// with the driver: a timed-out wait, or the driver rejecting the requeue
/// of a buffer it still holds.
fn needs_restart(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::InvalidInput
    )
}

fn fourcc_for(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
        PixelFormat::Nv12 => FourCC::new(b"NV12"),
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_dequeue_restarts_stream() {
        assert!(needs_restart(&io::Error::from(io::ErrorKind::TimedOut)));
        // EINVAL from queueing a buffer the driver already owns
        assert!(needs_restart(&io::Error::from_raw_os_error(22)));
    }

    #[test]
    fn test_other_errors_keep_stream() {
        assert!(!needs_restart(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!needs_restart(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(fourcc_for(PixelFormat::Mjpeg), FourCC::new(b"MJPG"));
        assert_eq!(fourcc_for(PixelFormat::Yuyv4), FourCC::new(b"YUYV"));
        assert_eq!(fourcc_for(PixelFormat::Nv12), FourCC::new(b"NV12"));
    }
}
