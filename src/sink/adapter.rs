//! Sink message handling on the real-time thread
//!
//! The adapter wraps the host's render side and intercepts the codes the
//! tunnel cares about: latency queries and the socket hand-over from the
//! control thread. Everything else is passed to the host unchanged.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::bridge::SinkMessage;
use crate::rt::poll::{MessageHandler, PollChange};
use crate::sink::host::SinkHost;
use crate::transport::PlaybackStream;

pub struct SinkAdapter<H> {
    /// Render side owned by the host
    host: H,
    /// Set once the control thread has passed a ready stream
    connected: bool,
    /// Remote stream shared with the control thread
    stream: Option<Arc<dyn PlaybackStream>>,
}

impl<H: SinkHost> SinkAdapter<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            connected: false,
            stream: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Remote stream latency, or zero when unlinked or unknown
    ///
    /// Local buffering is not added on top of the remote figure.
    pub fn latency(&self) -> Duration {
        if !self.host.state().is_linked() {
            return Duration::ZERO;
        }

        self.stream
            .as_ref()
            .and_then(|stream| stream.latency())
            .map(|latency| latency.as_duration())
            .unwrap_or(Duration::ZERO)
    }

    /// The stream, if data may be moved into it right now
    pub fn writable_stream(&self) -> Option<Arc<dyn PlaybackStream>> {
        if !self.connected || !self.host.state().is_opened() {
            return None;
        }

        self.stream
            .as_ref()
            .filter(|stream| stream.state().is_good())
            .cloned()
    }
}

impl<H: SinkHost> MessageHandler for SinkAdapter<H> {
    fn process_msg(&mut self, msg: SinkMessage) -> Option<PollChange> {
        match msg {
            SinkMessage::GetLatency { reply } => {
                let _ = reply.send(self.latency());
                None
            }
            SinkMessage::PassSocket(stream) => {
                debug!("Stream passed to render thread");
                let readiness = stream.readiness();
                self.stream = Some(stream);
                self.connected = true;
                Some(PollChange::Register(readiness))
            }
            SinkMessage::RipSocket => {
                debug!("Stream ripped from render thread");
                self.stream = None;
                Some(PollChange::Unregister)
            }
            SinkMessage::ConnectionLost => {
                debug!("Connection lost");
                self.connected = false;
                self.stream = None;
                Some(PollChange::Unregister)
            }
            SinkMessage::Host(msg) => {
                self.host.process_msg(msg);
                None
            }
        }
    }
}
