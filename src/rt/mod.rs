//! Real-time thread: event wait and render loop

pub mod poll;
pub mod render;

pub use poll::{MessageHandler, PollChange, PollSet, PollStatus};
pub use render::{LoopStats, RenderLoop};
