//! In-memory host and transport doubles for unit tests

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::chunk::AudioChunk;
use crate::connection::state::StreamState;
use crate::error::TransportError;
use crate::sink::host::{HostMessage, SinkHost, SinkState};
use crate::transport::{
    ConnectFlags, Latency, PlaybackStream, Readiness, SeekMode, StreamParams, Transport,
};

/// Memory block that counts how many blocks are still referenced
struct TrackedBlock {
    data: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for TrackedBlock {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for TrackedBlock {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared view of a [`FakeHost`] that stays with the test
pub struct HostRecorder {
    live_blocks: Arc<AtomicUsize>,
    render_limit: AtomicUsize,
    rewind_pending: AtomicBool,
    panic_on_render: AtomicBool,
    state: Mutex<SinkState>,
    renders: Mutex<Vec<usize>>,
    rewinds: Mutex<Vec<usize>>,
    host_messages: Mutex<Vec<HostMessage>>,
}

impl HostRecorder {
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::SeqCst)
    }

    /// Cap the size of rendered chunks; zero means no cap
    pub fn set_render_limit(&self, limit: usize) {
        self.render_limit.store(limit, Ordering::SeqCst);
    }

    /// Make render calls panic after recording their length
    pub fn set_panic_on_render(&self, panic: bool) {
        self.panic_on_render.store(panic, Ordering::SeqCst);
    }

    pub fn request_rewind(&self) {
        self.rewind_pending.store(true, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: SinkState) {
        *self.state.lock() = state;
    }

    pub fn state(&self) -> SinkState {
        *self.state.lock()
    }

    pub fn renders(&self) -> Vec<usize> {
        self.renders.lock().clone()
    }

    pub fn rewinds(&self) -> Vec<usize> {
        self.rewinds.lock().clone()
    }

    pub fn host_messages(&self) -> Vec<HostMessage> {
        self.host_messages.lock().clone()
    }
}

/// Host render side producing tracked blocks of a constant byte pattern
pub struct FakeHost {
    recorder: Arc<HostRecorder>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(HostRecorder {
                live_blocks: Arc::new(AtomicUsize::new(0)),
                render_limit: AtomicUsize::new(0),
                rewind_pending: AtomicBool::new(false),
                panic_on_render: AtomicBool::new(false),
                state: Mutex::new(SinkState::Running),
                renders: Mutex::new(Vec::new()),
                rewinds: Mutex::new(Vec::new()),
                host_messages: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn recorder(&self) -> Arc<HostRecorder> {
        self.recorder.clone()
    }
}

impl SinkHost for FakeHost {
    fn render(&mut self, length: usize) -> AudioChunk {
        let limit = self.recorder.render_limit.load(Ordering::SeqCst);
        let length = if limit > 0 { length.min(limit) } else { length };
        self.recorder.renders.lock().push(length);
        if self.recorder.panic_on_render.load(Ordering::SeqCst) {
            panic!("render failed");
        }

        self.recorder.live_blocks.fetch_add(1, Ordering::SeqCst);
        AudioChunk::from_block(Bytes::from_owner(TrackedBlock {
            data: vec![0xA5; length],
            live: self.recorder.live_blocks.clone(),
        }))
    }

    fn rewind_requested(&self) -> bool {
        self.recorder.rewind_pending.load(Ordering::SeqCst)
    }

    fn process_rewind(&mut self, amount: usize) {
        self.recorder.rewind_pending.store(false, Ordering::SeqCst);
        self.recorder.rewinds.lock().push(amount);
    }

    fn state(&self) -> SinkState {
        self.recorder.state()
    }

    fn process_msg(&mut self, msg: HostMessage) {
        if let HostMessage::SetState(state) = msg {
            self.recorder.set_state(state);
        }
        self.recorder.host_messages.lock().push(msg);
    }
}

/// Mutable state of a [`FakeStream`]
#[derive(Debug, Clone)]
pub struct FakeStreamState {
    pub state: StreamState,
    pub corked: bool,
    pub writable: usize,
    pub fail_writes: bool,
    pub latency: Option<Latency>,
    pub writes: Vec<Vec<u8>>,
    pub cork_requests: Vec<bool>,
    pub disconnected: bool,
}

/// Playback stream that records writes; starts ready and corked
pub struct FakeStream {
    inner: Mutex<FakeStreamState>,
    ready_tx: Sender<Readiness>,
    ready_rx: Receiver<Readiness>,
}

impl FakeStream {
    pub fn new() -> Arc<Self> {
        let (ready_tx, ready_rx) = unbounded();
        Arc::new(Self {
            inner: Mutex::new(FakeStreamState {
                state: StreamState::Ready,
                corked: true,
                writable: 0,
                fail_writes: false,
                latency: None,
                writes: Vec::new(),
                cork_requests: Vec::new(),
                disconnected: false,
            }),
            ready_tx,
            ready_rx,
        })
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeStreamState)) {
        f(&mut self.inner.lock());
    }

    pub fn snapshot(&self) -> FakeStreamState {
        self.inner.lock().clone()
    }

    /// Bytes written so far, in order
    pub fn written(&self) -> Vec<usize> {
        self.inner.lock().writes.iter().map(Vec::len).collect()
    }

    pub fn notify(&self, readiness: Readiness) {
        let _ = self.ready_tx.send(readiness);
    }
}

impl PlaybackStream for FakeStream {
    fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    fn is_corked(&self) -> bool {
        self.inner.lock().corked
    }

    fn cork(&self, corked: bool) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock();
            inner.cork_requests.push(corked);
            inner.corked = corked;
        }
        self.notify(Readiness::Writable);
        Ok(())
    }

    fn writable_size(&self) -> usize {
        self.inner.lock().writable
    }

    fn write(&self, data: &[u8], _seek: SeekMode) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        inner.writes.push(data.to_vec());
        Ok(())
    }

    fn latency(&self) -> Option<Latency> {
        self.inner.lock().latency
    }

    fn readiness(&self) -> Receiver<Readiness> {
        self.ready_rx.clone()
    }

    fn disconnect(&self) {
        self.inner.lock().disconnected = true;
    }
}

/// Shared view of a [`FakeTransport`]
#[derive(Default)]
pub struct TransportRecorder {
    pub fail_connect: AtomicBool,
    pub fail_stream: AtomicBool,
    pub disconnected: AtomicBool,
    pub connected_to: Mutex<Option<(String, ConnectFlags)>>,
    pub streams: Mutex<Vec<(StreamParams, Arc<FakeStream>)>>,
}

impl TransportRecorder {
    pub fn last_stream(&self) -> Option<Arc<FakeStream>> {
        self.streams.lock().last().map(|(_, stream)| stream.clone())
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

pub struct FakeTransport {
    recorder: Arc<TransportRecorder>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(TransportRecorder::default()),
        }
    }

    pub fn recorder(&self) -> Arc<TransportRecorder> {
        self.recorder.clone()
    }
}

impl Transport for FakeTransport {
    fn connect(&mut self, server: &str, flags: ConnectFlags) -> Result<(), TransportError> {
        if self.recorder.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(server.to_string()));
        }
        *self.recorder.connected_to.lock() = Some((server.to_string(), flags));
        Ok(())
    }

    fn create_stream(
        &mut self,
        params: &StreamParams,
    ) -> Result<Arc<dyn PlaybackStream>, TransportError> {
        if self.recorder.fail_stream.load(Ordering::SeqCst) {
            return Err(TransportError::StreamCreation("injected failure".into()));
        }
        let stream = FakeStream::new();
        stream.update(|s| {
            s.state = StreamState::Creating;
            s.corked = params.flags.start_corked;
        });
        self.recorder
            .streams
            .lock()
            .push((params.clone(), stream.clone()));
        Ok(stream)
    }

    fn disconnect(&mut self) {
        self.recorder.disconnected.store(true, Ordering::SeqCst);
    }
}
