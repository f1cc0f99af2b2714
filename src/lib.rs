//! # Tunnel Sink
//!
//! A local audio sink whose rendered output is forwarded to a playback
//! stream on a remote audio server.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── CONTROL THREAD ─────────────────────────────┐
//! │                                                                             │
//! │   TunnelConfig ──► TunnelSinkModule (module)                                │
//! │                        │                                                    │
//! │                        ├──► DeviceGraph: create / link / unlink / destroy   │
//! │                        │                                                    │
//! │   TransportEvent ──► ConnectionStateMachine (connection::machine)           │
//! │   (context/stream)     │  owns Transport + PlaybackStream handles           │
//! │                        │                                                    │
//! └────────────────────────┼────────────────────────────────────────────────────┘
//!                          │  bridge: ThreadMessage ▼      ▲ ControlMessage
//!                          │  (PassSocket, RipSocket,      │ (UnloadModule)
//!                          │   ConnectionLost, GetLatency) │
//! ┌────────────────────────┼───────────────────────────────┼── REAL-TIME THREAD ┐
//! │                        ▼                               │                    │
//! │   PollSet (rt::poll): inbox + stream readiness ────────┘                    │
//! │        │                                                                    │
//! │        ▼                                                                    │
//! │   SinkAdapter (sink::adapter) ──► SinkHost::render ──► ChunkSlot            │
//! │        │                                                  │                 │
//! │        ▼                                                  ▼                 │
//! │   RenderLoop (rt::render): uncork, write min(chunk, writable) ──► stream    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod module;
pub mod rt;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::TunnelConfig;
pub use error::{Error, Result};
pub use module::{RunExit, TunnelSinkModule};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default sample rate of the sink
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u8 = 2;

    /// Upper bound on channels in a sample spec or channel map
    pub const MAX_CHANNELS: usize = 32;

    pub const DEFAULT_SINK_NAME: &str = "remote_sink";

    /// Name of the real-time thread
    pub const RENDER_THREAD_NAME: &str = "tunnel-sink";

    /// Name of the remote playback stream
    pub const STREAM_NAME: &str = "tunnel-sink";

    /// How long a latency query waits for the real-time thread
    pub const LATENCY_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

    /// Port assumed when a TCP server address has none
    pub const TCP_DEFAULT_PORT: u16 = 4713;

    pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub const TCP_RETRY_INTERVAL: Duration = Duration::from_secs(1);

    /// Audio kept in flight on the TCP stream
    pub const TCP_TARGET_LATENCY: Duration = Duration::from_millis(200);

    /// Writes queued for the TCP writer thread
    pub const TCP_WRITE_QUEUE_DEPTH: usize = 64;
}
