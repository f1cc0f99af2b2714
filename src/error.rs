//! Error types for the tunnel sink

use thiserror::Error;

use crate::connection::state::{ContextState, StreamState};

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the transport carrying bytes to the remote server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Stream creation failed: {0}")]
    StreamCreation(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Cork request failed: {0}")]
    CorkFailed(String),

    #[error("Transport is not ready")]
    NotReady,

    #[error("Transport closed")]
    Closed,
}

/// Host sink errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Failed to create sink: {0}")]
    CreateFailed(String),

    #[error("Invalid chunk: index {index} + length {length} exceeds block of {capacity} bytes")]
    InvalidChunk {
        index: usize,
        length: usize,
        capacity: usize,
    },
}

/// Cross-thread message bridge errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Message queue disconnected")]
    Disconnected,

    #[error("Timed out waiting for reply")]
    Timeout,

    #[error("Failed to spawn real-time thread: {0}")]
    ThreadSpawn(String),

    #[error("Real-time thread panicked")]
    ThreadPanicked,
}

/// Rejected state-machine transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid context transition {from:?} -> {to:?}")]
    InvalidContextTransition { from: ContextState, to: ContextState },

    #[error("Invalid stream transition {from:?} -> {to:?}")]
    InvalidStreamTransition { from: StreamState, to: StreamState },
}

/// Failures of the real-time poll wait
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Message inbox disconnected")]
    Disconnected,

    #[error("Poll source fault: {0}")]
    Fault(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
