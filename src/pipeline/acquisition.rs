//! Background frame acquisition loop and its controller handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::capture::{Frame, FrameSource};
use crate::display::{convert, DisplaySink};
use crate::pipeline::mode::{AtomicRunMode, RunMode};
use crate::pipeline::ringbuf::{BufferStats, FrameBuffer};

type SharedSource = Box<dyn FrameSource>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Capture thread panicked")]
    Panicked,
}

/// State shared by the capture thread and its controller
struct Shared {
    mode: AtomicRunMode,
    stop: AtomicBool,
    /// Locked before `buffer` whenever both are held
    source: Mutex<Option<SharedSource>>,
    buffer: FrameBuffer,
    sink: Option<Arc<dyn DisplaySink>>,
    idle_sleep: Duration,
}

impl Shared {
    fn lock_source(&self) -> MutexGuard<'_, Option<SharedSource>> {
        self.source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pull one frame from the source into the buffer.
    ///
    /// A missing, closed or failing source leaves the buffer untouched.
    fn acquire(&self) -> bool {
        let mut guard = self.lock_source();
        let Some(source) = guard.as_mut() else {
            return false;
        };
        if !source.is_ready() {
            return false;
        }

        match source.read_frame() {
            Ok(frame) => {
                trace!(seq = frame.sequence, "Acquired frame");
                metrics::counter!("frames_captured").increment(1);
                if let Some(old) = self.buffer.admit(frame) {
                    trace!(seq = old.sequence, "Evicted oldest frame");
                    metrics::counter!("frames_evicted").increment(1);
                }
                true
            }
            Err(e) => {
                if e.is_transient() {
                    debug!("No frame this round: {}", e);
                } else {
                    warn!("Frame source error: {}", e);
                }
                metrics::counter!("capture_errors").increment(1);
                false
            }
        }
    }

    fn pop(&self) -> Option<Frame> {
        if self.buffer.is_empty() {
            self.acquire();
        }
        self.buffer.pop_oldest()
    }

    fn flush(&self) -> usize {
        let previous = self.mode.load();
        self.mode.store(RunMode::Idle);

        // Holding the source lock waits out an in-flight acquire
        let dropped = {
            let _source = self.lock_source();
            self.buffer.drain()
        };

        // Restores the mode seen on entry, even if it changed meanwhile
        self.mode.store(previous);
        debug!(dropped, mode = %previous, "Flushed frame buffer");
        dropped
    }

    fn forward_latest(&self) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        let Some(frame) = self.buffer.latest() else {
            return;
        };

        match convert::to_display(&frame) {
            Some(image) => {
                sink.deliver(image);
                metrics::counter!("frames_forwarded").increment(1);
            }
            None => trace!(
                seq = frame.sequence,
                channels = frame.channels,
                "Frame not displayable, dropped"
            ),
        }
    }

    fn run(&self) {
        info!("Capture thread started");

        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            match self.mode.load() {
                RunMode::Idle => thread::sleep(self.idle_sleep),
                RunMode::Capture => {
                    self.acquire();
                }
                RunMode::Preview => {
                    if self.acquire() {
                        self.forward_latest();
                    }
                }
                RunMode::Stop => break,
            }

            thread::yield_now();
        }

        let stats = self.buffer.stats();
        info!(
            admitted = stats.admitted,
            evicted = stats.evicted,
            popped = stats.popped,
            "Capture thread exiting"
        );
    }
}

/// Handle to a running capture thread.
///
/// All methods may be called from any thread while the loop runs. Dropping
/// the handle requests a stop and joins the thread.
pub struct CaptureThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn builder() -> CaptureThreadBuilder {
        CaptureThreadBuilder::default()
    }

    pub fn set_mode(&self, mode: RunMode) {
        let old = self.shared.mode.swap(mode);
        if old != mode {
            debug!(from = %old, to = %mode, "Run mode changed");
        }
    }

    pub fn mode(&self) -> RunMode {
        self.shared.mode.load()
    }

    /// Ask the loop to exit at the top of its next iteration.
    ///
    /// Takes precedence over the run mode.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Take the oldest buffered frame.
    ///
    /// An empty buffer gets one synchronous acquire attempt first; `None`
    /// means no frame could be had. Never waits for the capture thread.
    pub fn pop(&self) -> Option<Frame> {
        self.shared.pop()
    }

    /// Drop all buffered frames, pausing capture while doing so.
    ///
    /// The mode is captured on entry and written back on exit, which
    /// silently reverts a `set_mode` issued while the flush was running.
    pub fn flush(&self) -> usize {
        self.shared.flush()
    }

    /// Run one acquire on the caller's thread; returns whether a frame
    /// was admitted.
    pub fn acquire(&self) -> bool {
        self.shared.acquire()
    }

    pub fn buffered(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn stats(&self) -> BufferStats {
        self.shared.buffer.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to exit. Does not request a stop by itself.
    pub fn join(mut self) -> Result<(), PipelineError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<(), PipelineError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| PipelineError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            if let Err(e) = self.join_inner() {
                warn!("{}", e);
            }
        }
    }
}

/// Configures and spawns a [`CaptureThread`]
pub struct CaptureThreadBuilder {
    source: Option<SharedSource>,
    sink: Option<Arc<dyn DisplaySink>>,
    capacity: usize,
    idle_sleep: Duration,
    initial_mode: RunMode,
    pin_core: Option<usize>,
    thread_name: String,
}

impl Default for CaptureThreadBuilder {
    /// Seeded from the active runtime configuration
    fn default() -> Self {
        let config = crate::CONFIG.load();
        Self {
            source: None,
            sink: None,
            capacity: config.pipeline.queue_capacity,
            idle_sleep: Duration::from_millis(config.pipeline.idle_sleep_ms),
            initial_mode: RunMode::Idle,
            pin_core: config.pipeline.pin_core,
            thread_name: "aperture-capture".into(),
        }
    }
}

impl CaptureThreadBuilder {
    pub fn source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn sink(mut self, sink: impl DisplaySink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Buffer capacity; zero is bumped to one
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    pub fn initial_mode(mut self, mode: RunMode) -> Self {
        self.initial_mode = mode;
        self
    }

    pub fn pin_core(mut self, core: Option<usize>) -> Self {
        self.pin_core = core;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn spawn(self) -> Result<CaptureThread, PipelineError> {
        let shared = Arc::new(Shared {
            mode: AtomicRunMode::new(self.initial_mode),
            stop: AtomicBool::new(false),
            source: Mutex::new(self.source),
            buffer: FrameBuffer::new(self.capacity.max(1)),
            sink: self.sink,
            idle_sleep: self.idle_sleep,
        });

        let pin_core = self.pin_core;
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(self.thread_name)
            .spawn(move || {
                if let Some(id) = pin_core {
                    pin_current_thread(id);
                }
                worker.run();
            })?;

        info!(
            capacity = shared.buffer.capacity(),
            mode = %self.initial_mode,
            "Spawned capture thread"
        );

        Ok(CaptureThread {
            shared,
            handle: Some(handle),
        })
    }
}

fn pin_current_thread(id: usize) {
    let core = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|core| core.id == id));

    match core {
        Some(core) if core_affinity::set_for_current(core) => {
            debug!("Capture thread pinned to core {}", id)
        }
        _ => warn!("Could not pin capture thread to core {}", id),
    }
}
