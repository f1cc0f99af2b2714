//! Sink device seen from both threads

pub mod adapter;
pub mod host;

pub use adapter::SinkAdapter;
pub use host::{DeviceGraph, HostMessage, SinkDescriptor, SinkFlags, SinkHost, SinkState};
