//! Connection and stream lifecycle, driven on the control thread
//!
//! Transport notifications are fed in as [`TransportEvent`]s. The machine
//! owns the connection and stream handles outright; the render thread only
//! learns about them through bridge messages.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bridge::{ControlEndpoint, SinkMessage};
use crate::connection::state::{ContextState, StreamState};
use crate::error::{StateError, TransportError};
use crate::transport::{ConnectFlags, PlaybackStream, StreamParams, Transport, TransportEvent};

struct StreamHandle {
    stream: Arc<dyn PlaybackStream>,
    state: StreamState,
}

pub struct ConnectionStateMachine {
    /// `None` once the connection handle has been released
    transport: Option<Box<dyn Transport>>,
    context: ContextState,
    stream: Option<StreamHandle>,
    params: StreamParams,
    bridge: ControlEndpoint,
}

impl ConnectionStateMachine {
    pub fn new(transport: Box<dyn Transport>, params: StreamParams, bridge: ControlEndpoint) -> Self {
        Self {
            transport: Some(transport),
            context: ContextState::Unconnected,
            stream: None,
            params,
            bridge,
        }
    }

    /// Begin the asynchronous connection attempt
    pub fn connect(&mut self, server: &str, flags: ConnectFlags) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        info!("Connecting to remote server {}", server);
        transport.connect(server, flags)
    }

    pub fn context_state(&self) -> ContextState {
        self.context
    }

    /// State of the current stream, `None` when there is none
    pub fn stream_state(&self) -> Option<StreamState> {
        self.stream.as_ref().map(|handle| handle.state)
    }

    pub fn has_connection(&self) -> bool {
        self.transport.is_some()
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), StateError> {
        match event {
            TransportEvent::Context(state) => self.on_context_state(state),
            TransportEvent::Stream(state) => self.on_stream_state(state),
        }
    }

    pub fn on_context_state(&mut self, next: ContextState) -> Result<(), StateError> {
        if self.transport.is_none() {
            debug!("Context event {:?} after release, ignoring", next);
            return Ok(());
        }

        self.context = self.context.transition(next)?;

        match next {
            ContextState::Unconnected
            | ContextState::Connecting
            | ContextState::Authorizing
            | ContextState::SettingName => {
                debug!("Connection progressing: {:?}", next);
            }
            ContextState::Ready => {
                info!("Connection successful, creating stream");
                self.create_stream();
            }
            ContextState::Failed | ContextState::Terminated => {
                info!("Context {:?}", next);
                self.release_stream();
                self.release_context();
                self.post(SinkMessage::ConnectionLost);
            }
        }
        Ok(())
    }

    pub fn on_stream_state(&mut self, next: StreamState) -> Result<(), StateError> {
        let Some(handle) = self.stream.as_mut() else {
            debug!("Stream event {:?} without a stream, ignoring", next);
            return Ok(());
        };

        handle.state = handle.state.transition(next)?;

        match next {
            StreamState::Creating => {}
            StreamState::Ready => debug!("Stream ready"),
            StreamState::Failed | StreamState::Terminated => {
                // No new stream is created; the sink goes quiet until the
                // connection is driven to Ready again.
                info!("Stream {:?}", next);
                self.release_stream();
                self.post(SinkMessage::RipSocket);
            }
        }
        Ok(())
    }

    /// Disconnect and release both handles; safe to call repeatedly
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.stream.take() {
            handle.stream.disconnect();
        }
        self.release_context();
    }

    fn create_stream(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        match transport.create_stream(&self.params) {
            Ok(stream) => {
                self.stream = Some(StreamHandle {
                    stream: stream.clone(),
                    state: stream.state(),
                });
                self.post(SinkMessage::PassSocket(stream));
            }
            Err(e) => warn!("Failed to create stream: {}", e),
        }
    }

    fn release_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("Stream released");
        }
    }

    fn release_context(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
            debug!("Connection released");
        }
    }

    fn post(&self, msg: SinkMessage) {
        let name = msg.name();
        if let Err(e) = self.bridge.post(msg) {
            warn!("Could not post {} to render thread: {}", name, e);
        }
    }
}
