//! Host and transport doubles shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tunnel_sink::audio::AudioChunk;
use tunnel_sink::connection::StreamState;
use tunnel_sink::error::{SinkError, TransportError};
use tunnel_sink::sink::{DeviceGraph, HostMessage, SinkDescriptor, SinkHost, SinkState};
use tunnel_sink::transport::{
    ConnectFlags, Latency, PlaybackStream, Readiness, SeekMode, StreamParams, Transport,
};

/// Poll `cond` until it holds or five seconds pass
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[derive(Default)]
pub struct GraphLog {
    pub calls: Mutex<Vec<&'static str>>,
    pub state: Mutex<Option<SinkState>>,
    pub renders: Mutex<Vec<usize>>,
    pub render_limit: Mutex<Option<usize>>,
}

impl GraphLog {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn renders(&self) -> Vec<usize> {
        self.renders.lock().clone()
    }
}

pub struct TestHost {
    log: Arc<GraphLog>,
}

impl SinkHost for TestHost {
    fn render(&mut self, length: usize) -> AudioChunk {
        let length = match *self.log.render_limit.lock() {
            Some(limit) => length.min(limit),
            None => length,
        };
        self.log.renders.lock().push(length);
        AudioChunk::from_block(Bytes::from(vec![0x5A; length]))
    }

    fn rewind_requested(&self) -> bool {
        false
    }

    fn process_rewind(&mut self, _amount: usize) {}

    fn state(&self) -> SinkState {
        self.log.state.lock().unwrap_or(SinkState::Init)
    }

    fn process_msg(&mut self, msg: HostMessage) {
        if let HostMessage::SetState(state) = msg {
            *self.log.state.lock() = Some(state);
        }
    }
}

pub struct TestGraph(pub Arc<GraphLog>);

impl DeviceGraph for TestGraph {
    type Sink = TestHost;

    fn create_sink(&mut self, _descriptor: &SinkDescriptor) -> Result<TestHost, SinkError> {
        self.0.calls.lock().push("create");
        *self.0.state.lock() = Some(SinkState::Init);
        Ok(TestHost {
            log: self.0.clone(),
        })
    }

    fn link(&mut self) {
        self.0.calls.lock().push("link");
        *self.0.state.lock() = Some(SinkState::Running);
    }

    fn unlink(&mut self) {
        self.0.calls.lock().push("unlink");
        *self.0.state.lock() = Some(SinkState::Unlinked);
    }

    fn destroy(&mut self) {
        self.0.calls.lock().push("destroy");
    }
}

#[derive(Debug, Clone)]
pub struct StreamControl {
    pub state: StreamState,
    pub corked: bool,
    pub writable: usize,
    pub fail_writes: bool,
    pub latency: Option<Latency>,
    pub writes: Vec<usize>,
    pub failed_writes: usize,
    pub disconnected: bool,
}

pub struct TestStream {
    control: Mutex<StreamControl>,
    ready_tx: Sender<Readiness>,
    ready_rx: Receiver<Readiness>,
}

impl TestStream {
    pub fn update(&self, f: impl FnOnce(&mut StreamControl)) {
        f(&mut self.control.lock());
    }

    pub fn snapshot(&self) -> StreamControl {
        self.control.lock().clone()
    }

    pub fn written(&self) -> Vec<usize> {
        self.control.lock().writes.clone()
    }

    pub fn notify(&self, readiness: Readiness) {
        let _ = self.ready_tx.send(readiness);
    }
}

impl PlaybackStream for TestStream {
    fn state(&self) -> StreamState {
        self.control.lock().state
    }

    fn is_corked(&self) -> bool {
        self.control.lock().corked
    }

    fn cork(&self, corked: bool) -> Result<(), TransportError> {
        self.control.lock().corked = corked;
        self.notify(Readiness::Writable);
        Ok(())
    }

    fn writable_size(&self) -> usize {
        self.control.lock().writable
    }

    fn write(&self, data: &[u8], _seek: SeekMode) -> Result<(), TransportError> {
        let mut control = self.control.lock();
        if control.fail_writes {
            control.failed_writes += 1;
            return Err(TransportError::WriteFailed("peer gone".into()));
        }
        control.writes.push(data.len());
        Ok(())
    }

    fn latency(&self) -> Option<Latency> {
        self.control.lock().latency
    }

    fn readiness(&self) -> Receiver<Readiness> {
        self.ready_rx.clone()
    }

    fn disconnect(&self) {
        self.control.lock().disconnected = true;
    }
}

/// Shared view of a [`TestTransport`]
pub struct TransportLog {
    /// Writable size given to newly created streams
    pub initial_writable: Mutex<usize>,
    pub connected_to: Mutex<Option<String>>,
    pub streams: Mutex<Vec<Arc<TestStream>>>,
    pub disconnected: Mutex<bool>,
}

impl TransportLog {
    pub fn stream(&self) -> Option<Arc<TestStream>> {
        self.streams.lock().last().cloned()
    }
}

pub struct TestTransport(pub Arc<TransportLog>);

impl TestTransport {
    pub fn new(initial_writable: usize) -> (Self, Arc<TransportLog>) {
        let log = Arc::new(TransportLog {
            initial_writable: Mutex::new(initial_writable),
            connected_to: Mutex::new(None),
            streams: Mutex::new(Vec::new()),
            disconnected: Mutex::new(false),
        });
        (Self(log.clone()), log)
    }
}

impl Transport for TestTransport {
    fn connect(&mut self, server: &str, _flags: ConnectFlags) -> Result<(), TransportError> {
        *self.0.connected_to.lock() = Some(server.to_string());
        Ok(())
    }

    fn create_stream(
        &mut self,
        params: &StreamParams,
    ) -> Result<Arc<dyn PlaybackStream>, TransportError> {
        let (ready_tx, ready_rx) = unbounded();
        let stream = Arc::new(TestStream {
            control: Mutex::new(StreamControl {
                state: StreamState::Creating,
                corked: params.flags.start_corked,
                writable: *self.0.initial_writable.lock(),
                fail_writes: false,
                latency: None,
                writes: Vec::new(),
                failed_writes: 0,
                disconnected: false,
            }),
            ready_tx,
            ready_rx,
        });
        self.0.streams.lock().push(stream.clone());
        Ok(stream)
    }

    fn disconnect(&mut self) {
        *self.0.disconnected.lock() = true;
    }
}
