//! Render/transmit loop of the real-time thread
//!
//! Each iteration pulls at most one chunk from the host and pushes it into
//! the remote stream, limited by what the stream currently accepts. Between
//! iterations the thread sleeps in the poll set until a message or stream
//! readiness arrives.

use crossbeam_channel::Sender;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::audio::chunk::ChunkSlot;
use crate::bridge::{ControlMessage, RtEndpoint, ShutdownAck};
use crate::error::BridgeError;
use crate::rt::poll::{PollSet, PollStatus};
use crate::sink::adapter::SinkAdapter;
use crate::sink::host::SinkHost;
use crate::transport::SeekMode;

/// Counters kept by the real-time thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Passes through [`RenderLoop::iterate`]
    pub iterations: u64,
    /// Chunks pulled from the host
    pub chunks_rendered: u64,
    /// Bytes accepted by the remote stream
    pub bytes_written: u64,
    /// Writes the stream rejected; their data was dropped
    pub write_failures: u64,
    /// Times a corked stream was asked to uncork
    pub uncork_requests: u64,
    /// Host rewinds acknowledged
    pub rewinds: u64,
}

pub struct RenderLoop<H> {
    /// Host render side plus the attached stream
    sink: SinkAdapter<H>,
    /// Rendered data not yet written; empty between iterations
    chunk: ChunkSlot,
    /// Wake sources: bridge inbox and stream readiness
    poll: PollSet,
    /// Requests to the control thread
    outbox: Sender<ControlMessage>,
    /// Counters returned when the loop exits
    stats: LoopStats,
}

impl<H: SinkHost> RenderLoop<H> {
    pub fn new(sink: SinkAdapter<H>, endpoint: RtEndpoint) -> Self {
        let (inbox, outbox) = endpoint.split();
        Self {
            sink,
            chunk: ChunkSlot::new(),
            poll: PollSet::new(inbox),
            outbox,
            stats: LoopStats::default(),
        }
    }

    pub fn sink(&self) -> &SinkAdapter<H> {
        &self.sink
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self, name: &str) -> Result<JoinHandle<LoopStats>, BridgeError>
    where
        H: 'static,
    {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
            .map_err(|e| BridgeError::ThreadSpawn(e.to_string()))
    }

    /// Loop until shutdown; returns the final counters
    pub fn run(mut self) -> LoopStats {
        debug!("Render thread starting up");

        let ack = loop {
            self.iterate();

            match self.poll.run(&mut self.sink) {
                Ok(PollStatus::Events(_)) => {}
                Ok(PollStatus::Shutdown(ack)) => break ack,
                Err(e) => {
                    error!("Render thread poll failed: {}", e);
                    break self.fail();
                }
            }
        };

        self.chunk.clear();
        debug!(
            "Render thread shutting down after {} iterations, {} bytes written",
            self.stats.iterations, self.stats.bytes_written
        );
        ack.complete();
        self.stats
    }

    /// Ask the control side to unload us, then keep serving messages until
    /// the shutdown request arrives
    fn fail(&mut self) -> ShutdownAck {
        if self.outbox.send(ControlMessage::UnloadModule).is_err() {
            warn!("Control side is gone, cannot request unload");
        }
        self.poll.wait_for_shutdown(&mut self.sink)
    }

    /// One pass of rewind handling and data transfer; never blocks
    pub fn iterate(&mut self) {
        self.stats.iterations += 1;

        if self.sink.host().rewind_requested() {
            self.sink.host_mut().process_rewind(0);
            self.stats.rewinds += 1;
        }

        let Some(stream) = self.sink.writable_stream() else {
            return;
        };

        if stream.is_corked() {
            self.stats.uncork_requests += 1;
            if let Err(e) = stream.cork(false) {
                warn!("Could not uncork stream: {}", e);
            }
            return;
        }

        let writable = stream.writable_size();
        if writable == 0 {
            return;
        }

        if self.chunk.is_empty() {
            let chunk = self.sink.host_mut().render(writable);
            self.stats.chunks_rendered += 1;
            self.chunk.fill(chunk);
        }

        // The chunk is released when it goes out of scope, written or not
        let Some(chunk) = self.chunk.take() else {
            return;
        };
        let length = chunk.len().min(writable);

        match stream.write(&chunk.as_slice()[..length], SeekMode::Relative) {
            Ok(()) => self.stats.bytes_written += length as u64,
            Err(e) => {
                self.stats.write_failures += 1;
                warn!("Could not write data into the stream: {}", e);
            }
        }
    }
}
