use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// What the capture thread does on each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// No capture work; the loop sleeps briefly
    #[default]
    Idle,
    /// Acquire frames into the buffer
    Capture,
    /// Acquire and forward the newest frame to the display
    Preview,
    /// Terminal; the loop exits once it observes this
    Stop,
}

impl RunMode {
    fn as_u8(self) -> u8 {
        match self {
            RunMode::Idle => 0,
            RunMode::Capture => 1,
            RunMode::Preview => 2,
            RunMode::Stop => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RunMode::Idle,
            1 => RunMode::Capture,
            2 => RunMode::Preview,
            _ => RunMode::Stop,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Idle => "idle",
            RunMode::Capture => "capture",
            RunMode::Preview => "preview",
            RunMode::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Run mode shared between the capture thread and its controller.
///
/// Single-word loads and stores only; the loop may act on a value that is
/// one iteration stale.
#[derive(Debug)]
pub struct AtomicRunMode(AtomicU8);

impl AtomicRunMode {
    pub fn new(mode: RunMode) -> Self {
        Self(AtomicU8::new(mode.as_u8()))
    }

    pub fn load(&self) -> RunMode {
        RunMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, mode: RunMode) {
        self.0.store(mode.as_u8(), Ordering::Release);
    }

    /// Store `mode`, returning the mode it replaced
    pub fn swap(&self, mode: RunMode) -> RunMode {
        RunMode::from_u8(self.0.swap(mode.as_u8(), Ordering::AcqRel))
    }
}

impl Default for AtomicRunMode {
    fn default() -> Self {
        Self::new(RunMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert_eq!(AtomicRunMode::default().load(), RunMode::Idle);
    }

    #[test]
    fn test_store_and_swap() {
        let mode = AtomicRunMode::new(RunMode::Capture);
        mode.store(RunMode::Preview);
        assert_eq!(mode.load(), RunMode::Preview);

        assert_eq!(mode.swap(RunMode::Idle), RunMode::Preview);
        assert_eq!(mode.load(), RunMode::Idle);

        mode.store(RunMode::Stop);
        assert_eq!(mode.load(), RunMode::Stop);
    }

    #[test]
    fn test_display_matches_config_names() {
        assert_eq!(RunMode::Preview.to_string(), "preview");
        assert_eq!(RunMode::Capture.to_string(), "capture");
    }
}
