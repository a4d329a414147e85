pub mod acquisition;
pub mod mode;
pub mod ringbuf;

pub use acquisition::{CaptureThread, CaptureThreadBuilder, PipelineError};
pub use mode::{AtomicRunMode, RunMode};
pub use self::ringbuf::{BufferStats, FrameBuffer};
