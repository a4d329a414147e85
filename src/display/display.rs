//! SDL2 Window Display Module
//! Renders preview images received from the capture thread and maps the
//! keyboard onto capture-thread controls.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use flume::{Receiver, RecvTimeoutError};
use image::RgbImage;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use tracing::{debug, info};

use crate::pipeline::{CaptureThread, RunMode};
use crate::DisplayConfig;

/// Upper bound on how long the event loop waits for a preview image
const FRAME_WAIT: Duration = Duration::from_millis(16);

/// What a key press asks the capture thread to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode(RunMode),
    Flush,
    Pop,
    Quit,
}

impl Command {
    pub fn from_keycode(key: Keycode) -> Option<Self> {
        let command = match key {
            Keycode::I => Command::SetMode(RunMode::Idle),
            Keycode::C => Command::SetMode(RunMode::Capture),
            Keycode::P => Command::SetMode(RunMode::Preview),
            Keycode::F => Command::Flush,
            Keycode::Space => Command::Pop,
            Keycode::Escape => Command::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Apply to `capture`; returns false once the display should close
    pub fn apply(self, capture: &CaptureThread) -> bool {
        match self {
            Command::SetMode(mode) => capture.set_mode(mode),
            Command::Flush => {
                let dropped = capture.flush();
                info!("Flushed {} buffered frames", dropped);
            }
            Command::Pop => match capture.pop() {
                Some(frame) => info!(
                    "Popped frame {} ({}x{}, {} channels), {} still buffered",
                    frame.sequence,
                    frame.width,
                    frame.height,
                    frame.channels,
                    capture.buffered()
                ),
                None => info!("No frame available"),
            },
            Command::Quit => return false,
        }
        true
    }
}

/// SDL2 Window Display
/// Handles window creation, event loop, and frame rendering.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, config: &DisplayConfig) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window(&config.title, config.width, config.height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
        })
    }

    pub fn render_image(&mut self, image: &RgbImage) -> Result<()> {
        let (width, height) = image.dimensions();

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, image.as_raw(), (width * 3) as usize)
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();
        Ok(())
    }

    /// Run until the window closes or Escape is pressed
    pub fn run(
        &mut self,
        sdl_context: &sdl2::Sdl,
        rx: Receiver<RgbImage>,
        capture: &CaptureThread,
    ) -> Result<()> {
        let mut event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        'running: loop {
            for event in event_pump.poll_iter() {
                let command = match event {
                    Event::Quit { .. } => Some(Command::Quit),
                    Event::KeyDown {
                        keycode: Some(key),
                        repeat: false,
                        ..
                    } => Command::from_keycode(key),
                    _ => None,
                };

                if let Some(command) = command {
                    debug!("Key command: {:?}", command);
                    if !command.apply(capture) {
                        info!("Quit requested");
                        break 'running;
                    }
                }
            }

            match rx.recv_timeout(FRAME_WAIT) {
                Ok(image) => self.render_image(&image)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Preview channel closed");
                    break 'running;
                }
            }
        }

        Ok(())
    }
}
