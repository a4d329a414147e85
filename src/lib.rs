pub mod capture;
pub mod display;
pub mod pipeline;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use color_eyre::{eyre::ensure, eyre::WrapErr, Result};
use serde::{Deserialize, Serialize};

pub use capture::frame::{Frame, PixelFormat};
pub use pipeline::{CaptureThread, RunMode};

use crate::utils::FoundDevice;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Prefix for environment overrides, e.g. `APERTURE__PIPELINE__QUEUE_CAPACITY=50`
const ENV_PREFIX: &str = "APERTURE";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Empty path means auto-detect
    pub device: FoundDevice,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Longest a single dequeue may block
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames held before the oldest is evicted
    pub queue_capacity: usize,
    pub idle_sleep_ms: u64,
    pub initial_mode: RunMode,
    /// Preview images in flight to the display before new ones are dropped
    pub display_queue_depth: usize,
    pub pin_core: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: FoundDevice::default(),
            width: 800,
            height: 600,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            read_timeout_ms: 1000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Aperture".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            idle_sleep_ms: 10,
            initial_mode: RunMode::Preview,
            display_queue_depth: 2,
            pin_core: None,
        }
    }
}

impl Config {
    /// Layer `path` (TOML, optional) and `APERTURE__*` environment
    /// variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .wrap_err("Failed to load configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.pipeline.queue_capacity >= 1,
            "pipeline.queue_capacity must be at least 1"
        );
        ensure!(
            self.capture.width > 0 && self.capture.height > 0,
            "capture resolution must be non-zero"
        );
        ensure!(self.capture.fps > 0, "capture.fps must be non-zero");
        ensure!(
            self.capture.buffer_count > 0,
            "capture.buffer_count must be non-zero"
        );
        ensure!(
            self.display.width > 0 && self.display.height > 0,
            "display size must be non-zero"
        );
        Ok(())
    }
}
