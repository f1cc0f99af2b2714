//! Tagged messages exchanged between the control and real-time threads

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::sink::host::HostMessage;
use crate::transport::PlaybackStream;

/// Messages consumed by the real-time thread
pub enum ThreadMessage {
    /// Addressed to the sink running on the real-time thread
    Sink(SinkMessage),
    /// Terminal message; the thread exits after acknowledging it
    Shutdown { ack: Option<Sender<()>> },
}

/// Sink control codes handled by the sink adapter
pub enum SinkMessage {
    /// Report the current playback latency on `reply`
    GetLatency { reply: Sender<Duration> },
    /// A remote stream is open; hand its I/O side to the render loop
    PassSocket(Arc<dyn PlaybackStream>),
    /// The remote stream was released
    RipSocket,
    /// The connection to the remote server is gone
    ConnectionLost,
    /// Anything else goes to the host's generic handler
    Host(HostMessage),
}

impl SinkMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SinkMessage::GetLatency { .. } => "get-latency",
            SinkMessage::PassSocket(_) => "pass-socket",
            SinkMessage::RipSocket => "rip-socket",
            SinkMessage::ConnectionLost => "connection-lost",
            SinkMessage::Host(_) => "host",
        }
    }
}

impl fmt::Debug for SinkMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkMessage::Host(msg) => f.debug_tuple("Host").field(msg).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Debug for ThreadMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadMessage::Sink(msg) => f.debug_tuple("Sink").field(msg).finish(),
            ThreadMessage::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Messages from the real-time thread to the control side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The real-time thread hit a fatal error; the host should unload the sink
    UnloadModule,
}
