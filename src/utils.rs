use crate::capture::frame::PixelFormat;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

/// Highest device node probed during auto-detection
const MAX_VIDEO_NODE: u32 = 10;

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }

    /// Whether a device still has to be probed for
    pub fn is_unset(&self) -> bool {
        self.path.is_empty()
    }
}

impl Default for FoundDevice {
    fn default() -> Self {
        Self::new(String::new(), PixelFormat::Mjpeg)
    }
}

/// Decoder cost rank; lower is preferred. MJPEG keeps USB bandwidth low,
/// packed BGR needs no conversion at all.
fn preference(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Mjpeg => 0,
        PixelFormat::Yuyv4 => 1,
        PixelFormat::Nv12 => 2,
        PixelFormat::Bgr24 => 3,
        PixelFormat::Rgb24 => 4,
    }
}

fn format_of(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv4),
        b"NV12" => Some(PixelFormat::Nv12),
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"RGB3" => Some(PixelFormat::Rgb24),
        _ => None,
    }
}

/// The best format we can decode out of what a device offers
pub fn pick_format(offered: impl IntoIterator<Item = FourCC>) -> Option<PixelFormat> {
    offered
        .into_iter()
        .filter_map(format_of)
        .min_by_key(|format| preference(*format))
}

/// Probe `/dev/video*` and pick the capture node with the cheapest
/// decodable format; ties go to the lowest node number.
pub async fn auto_detect_device() -> Result<FoundDevice> {
    use std::path::Path;

    info!("Probing /dev/video0..{} for capture devices", MAX_VIDEO_NODE - 1);

    let mut best: Option<FoundDevice> = None;
    for i in 0..MAX_VIDEO_NODE {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            debug!("Cannot open {}", path);
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Metadata nodes share the driver but cannot stream frames
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!("{} ({}) is not a capture node", path, caps.card);
            continue;
        }

        let offered = dev
            .enum_formats()
            .map(|formats| formats.into_iter().map(|f| f.fourcc).collect::<Vec<_>>())
            .unwrap_or_default();
        let Some(format) = pick_format(offered) else {
            debug!("{} ({}) offers no decodable format", path, caps.card);
            continue;
        };

        debug!("{} ({}) can stream {:?}", path, caps.card, format);
        let better = best
            .as_ref()
            .map_or(true, |b| preference(format) < preference(b.format));
        if better {
            best = Some(FoundDevice::new(path, format));
        }
    }

    let found = best.ok_or_else(|| eyre!("No capture device with a decodable format"))?;
    info!("Selected {} ({:?})", found.path, found.format);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_mjpeg_over_raw() {
        let offered = [FourCC::new(b"YUYV"), FourCC::new(b"MJPG")];
        assert_eq!(pick_format(offered), Some(PixelFormat::Mjpeg));
    }

    #[test]
    fn test_skips_unknown_formats() {
        let offered = [FourCC::new(b"H264"), FourCC::new(b"NV12"), FourCC::new(b"GREY")];
        assert_eq!(pick_format(offered), Some(PixelFormat::Nv12));

        assert_eq!(pick_format([FourCC::new(b"H264")]), None);
        assert_eq!(pick_format(Vec::new()), None);
    }

    #[test]
    fn test_unset_device() {
        assert!(FoundDevice::default().is_unset());
        assert!(!FoundDevice::new("/dev/video2".into(), PixelFormat::Yuyv4).is_unset());
    }
}
