//! Cross-thread message bridge

pub mod message;
pub mod queue;

pub use message::{ControlMessage, SinkMessage, ThreadMessage};
pub use queue::{thread_mq, ControlEndpoint, RtEndpoint, ShutdownAck};
