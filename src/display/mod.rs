pub mod convert;
pub mod display;
pub mod sink;

pub use display::{Command, Sdl2Display};
pub use sink::{ChannelSink, DisplaySink};
