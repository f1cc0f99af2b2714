//! Transport interface to the remote audio server
//!
//! The transport owns the byte stream to the remote server, its handshake
//! and encoding. The sink only sees a connection that walks through
//! [`ContextState`]s and a playback stream that accepts raw bytes under
//! backpressure.

#[cfg(feature = "tcp")]
pub mod tcp;

use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::format::{ChannelMap, SampleSpec};
use crate::connection::state::{ContextState, StreamState};
use crate::error::TransportError;

#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

/// Asynchronous notifications delivered to the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Context(ContextState),
    Stream(StreamState),
}

/// Flags for [`Transport::connect`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectFlags {
    /// Keep trying instead of failing when the server is not reachable yet
    pub no_fail: bool,
    /// Never start a local server to satisfy the connection
    pub no_autospawn: bool,
}

/// Flags for stream creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub start_corked: bool,
    pub auto_timing_update: bool,
}

/// Server-side buffering request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAttr {
    pub maxlength: u32,
    pub tlength: u32,
    pub prebuf: u32,
    pub minreq: u32,
}

impl BufferAttr {
    /// Sentinel meaning "server default" for a single field
    pub const UNBOUNDED: u32 = u32::MAX;

    /// Leave every bound to the server
    pub fn unbounded() -> Self {
        Self {
            maxlength: Self::UNBOUNDED,
            tlength: Self::UNBOUNDED,
            prebuf: Self::UNBOUNDED,
            minreq: Self::UNBOUNDED,
        }
    }
}

/// Everything needed to open the remote playback stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub name: String,
    pub sample_spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub buffer_attr: BufferAttr,
    pub flags: StreamFlags,
    pub properties: BTreeMap<String, String>,
}

/// Seek mode of a stream write; upload streams only support relative writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Relative,
}

/// Remote latency as reported by the stream's timing info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub usec: u64,
    pub negative: bool,
}

impl Latency {
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.usec)
    }
}

/// Wake-up tokens sent by a stream to the real-time poll set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Writable size or cork state changed
    Writable,
    /// The stream's descriptor faulted
    Fault(String),
}

/// Thread-safe I/O side of a remote playback stream
///
/// The control thread creates and releases streams; the real-time thread
/// only uses these calls to move data.
pub trait PlaybackStream: Send + Sync {
    fn state(&self) -> StreamState;

    fn is_corked(&self) -> bool;

    /// Request a cork state change; completion is signalled via readiness
    fn cork(&self, corked: bool) -> Result<(), TransportError>;

    /// Bytes the stream accepts right now without blocking
    fn writable_size(&self) -> usize;

    fn write(&self, data: &[u8], seek: SeekMode) -> Result<(), TransportError>;

    /// `None` until timing information is available
    fn latency(&self) -> Option<Latency>;

    /// Channel woken whenever the stream can make progress
    fn readiness(&self) -> Receiver<Readiness>;

    fn disconnect(&self);
}

/// Connection to a remote audio server
///
/// State changes are reported asynchronously as [`TransportEvent`]s.
pub trait Transport: Send {
    /// Start connecting; returns once the attempt is under way
    fn connect(&mut self, server: &str, flags: ConnectFlags) -> Result<(), TransportError>;

    /// Open a playback stream on a ready connection
    fn create_stream(
        &mut self,
        params: &StreamParams,
    ) -> Result<Arc<dyn PlaybackStream>, TransportError>;

    fn disconnect(&mut self);
}
