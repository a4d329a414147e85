//! Aperture: background frame acquisition with SDL2 preview

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use aperture::capture::V4l2Capture;
use aperture::display::{ChannelSink, Sdl2Display};
use aperture::{utils, CaptureThread, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aperture=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Aperture launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;

    // Auto-detect capture device if needed
    if config.capture.device.is_unset() {
        let device = utils::auto_detect_device().await?;
        config.capture.format = device.format;
        config.capture.device = device;
    }
    aperture::CONFIG.store(Arc::new(config.clone()));

    info!("Using capture device: {:?}", config.capture.device);

    // Initialize capture
    let mut source = V4l2Capture::new(config.capture.clone())?;
    source.start_stream()?;
    let (width, height) = source.resolution();
    info!("Streaming at {}x{}", width, height);

    let (sink, rx) = ChannelSink::bounded(config.pipeline.display_queue_depth);
    let capture = CaptureThread::builder()
        .source(source)
        .sink(sink)
        .initial_mode(config.pipeline.initial_mode)
        .spawn()?;

    // SDL must stay on the main thread
    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let mut display = Sdl2Display::new(&sdl_context, &config.display)?;
    let result = display.run(&sdl_context, rx, &capture);

    info!("Aperture shutting down");
    capture.request_stop();
    capture.join()?;

    result
}
