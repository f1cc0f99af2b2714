//! Wake sources of the real-time thread
//!
//! The poll set always watches the bridge inbox. While a remote stream is
//! attached it also watches the stream's readiness channel. Every pending
//! message is dispatched before the thread is allowed to block again.

use crossbeam_channel::{Receiver, Select, TryRecvError};
use tracing::debug;

use crate::bridge::{ShutdownAck, SinkMessage, ThreadMessage};
use crate::error::PollError;
use crate::transport::Readiness;

/// Poll-set update requested by a dispatched message
#[derive(Debug)]
pub enum PollChange {
    Register(Receiver<Readiness>),
    Unregister,
}

/// Consumer of sink messages on the real-time thread
pub trait MessageHandler {
    fn process_msg(&mut self, msg: SinkMessage) -> Option<PollChange>;
}

/// Outcome of one [`PollSet::run`]
#[derive(Debug)]
pub enum PollStatus {
    /// Number of messages and readiness tokens handled
    Events(usize),
    /// Shutdown was requested; no further work may be done
    Shutdown(ShutdownAck),
}

pub struct PollSet {
    /// Messages from the control thread; always watched
    inbox: Receiver<ThreadMessage>,
    /// Readiness of the attached stream, if any
    stream: Option<Receiver<Readiness>>,
}

impl PollSet {
    pub fn new(inbox: Receiver<ThreadMessage>) -> Self {
        Self {
            inbox,
            stream: None,
        }
    }

    /// Whether a stream readiness source is registered
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Handle pending work, blocking without timeout until there is some
    pub fn run<H: MessageHandler>(&mut self, handler: &mut H) -> Result<PollStatus, PollError> {
        loop {
            let mut events = 0;

            loop {
                match self.inbox.try_recv() {
                    Ok(ThreadMessage::Shutdown { ack }) => {
                        return Ok(PollStatus::Shutdown(ShutdownAck::new(ack)));
                    }
                    Ok(ThreadMessage::Sink(msg)) => {
                        events += 1;
                        self.dispatch(handler, msg);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Err(PollError::Disconnected),
                }
            }

            events += self.drain_readiness()?;
            if events > 0 {
                return Ok(PollStatus::Events(events));
            }

            self.wait();
        }
    }

    /// Dispatch messages until shutdown, ignoring stream readiness
    ///
    /// Used after a fatal poll error so that queued requests still get
    /// answered and the terminal shutdown message is never missed.
    pub fn wait_for_shutdown<H: MessageHandler>(&mut self, handler: &mut H) -> ShutdownAck {
        self.stream = None;

        loop {
            match self.inbox.recv() {
                Ok(ThreadMessage::Shutdown { ack }) => return ShutdownAck::new(ack),
                Ok(ThreadMessage::Sink(msg)) => {
                    let _ = handler.process_msg(msg);
                }
                Err(_) => return ShutdownAck::default(),
            }
        }
    }

    fn dispatch<H: MessageHandler>(&mut self, handler: &mut H, msg: SinkMessage) {
        match handler.process_msg(msg) {
            Some(PollChange::Register(readiness)) => self.stream = Some(readiness),
            Some(PollChange::Unregister) => self.stream = None,
            None => {}
        }
    }

    fn drain_readiness(&mut self) -> Result<usize, PollError> {
        let Some(readiness) = &self.stream else {
            return Ok(0);
        };

        let mut events = 0;
        let mut hung_up = false;
        loop {
            match readiness.try_recv() {
                Ok(Readiness::Writable) => events += 1,
                Ok(Readiness::Fault(reason)) => return Err(PollError::Fault(reason)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    hung_up = true;
                    events += 1;
                    break;
                }
            }
        }

        if hung_up {
            debug!("Stream readiness source hung up");
            self.stream = None;
        }
        Ok(events)
    }

    fn wait(&self) {
        let mut select = Select::new();
        select.recv(&self.inbox);
        if let Some(readiness) = &self.stream {
            select.recv(readiness);
        }
        select.ready();
    }
}
