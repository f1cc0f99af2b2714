//! Audio data types shared by the control and real-time threads

pub mod chunk;
pub mod format;

pub use chunk::{AudioChunk, ChunkSlot};
pub use format::{ChannelMap, ChannelPosition, SampleFormat, SampleSpec};
