//! Raw PCM over a plain TCP connection
//!
//! There is no protocol handshake: once the socket is connected the context
//! reports ready, and stream data is written to the socket as-is. Useful
//! against a simple receiver such as `nc -l 4713 | aplay`.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::format::SampleSpec;
use crate::connection::state::{ContextState, StreamState};
use crate::constants::{
    TCP_CONNECT_TIMEOUT, TCP_DEFAULT_PORT, TCP_RETRY_INTERVAL, TCP_TARGET_LATENCY,
    TCP_WRITE_QUEUE_DEPTH,
};
use crate::error::TransportError;
use crate::transport::{
    ConnectFlags, Latency, PlaybackStream, Readiness, SeekMode, StreamParams, Transport,
    TransportEvent,
};

/// Tunables of the TCP transport
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub connect_timeout: Duration,
    /// Delay between attempts when connecting with `no_fail`
    pub retry_interval: Duration,
    /// Amount of audio allowed in flight; bounds `writable_size`
    pub target_latency: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: TCP_CONNECT_TIMEOUT,
            retry_interval: TCP_RETRY_INTERVAL,
            target_latency: TCP_TARGET_LATENCY,
        }
    }
}

/// State shared with the connector thread
struct Link {
    socket: Mutex<Option<TcpStream>>,
    cancelled: AtomicBool,
}

/// [`Transport`] writing raw PCM to one TCP peer
///
/// The peer does no buffering or timing negotiation, so the requested
/// `buffer_attr`, `auto_timing_update` and stream properties are not sent
/// anywhere. The amount of audio in flight is bounded by
/// [`TcpConfig::target_latency`] alone.
pub struct TcpTransport {
    config: TcpConfig,
    events: Sender<TransportEvent>,
    link: Arc<Link>,
    connector: Option<JoinHandle<()>>,
    stream: Option<Arc<TcpPlaybackStream>>,
}

impl TcpTransport {
    /// State changes are delivered on `events`
    pub fn new(events: Sender<TransportEvent>) -> Self {
        Self::with_config(events, TcpConfig::default())
    }

    pub fn with_config(events: Sender<TransportEvent>, config: TcpConfig) -> Self {
        Self {
            config,
            events,
            link: Arc::new(Link {
                socket: Mutex::new(None),
                cancelled: AtomicBool::new(false),
            }),
            connector: None,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, server: &str, flags: ConnectFlags) -> Result<(), TransportError> {
        if self.connector.is_some() {
            return Err(TransportError::ConnectFailed("already connecting".into()));
        }
        let address = parse_server(server)?;

        let link = self.link.clone();
        let events = self.events.clone();
        let config = self.config.clone();
        let handle = thread::Builder::new()
            .name("tunnel-connect".to_string())
            .spawn(move || run_connector(&address, flags, &config, &link, &events))
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        self.connector = Some(handle);
        Ok(())
    }

    fn create_stream(
        &mut self,
        params: &StreamParams,
    ) -> Result<Arc<dyn PlaybackStream>, TransportError> {
        let socket = {
            let guard = self.link.socket.lock();
            let socket = guard.as_ref().ok_or(TransportError::NotReady)?;
            socket
                .try_clone()
                .map_err(|e| TransportError::StreamCreation(e.to_string()))?
        };

        let target = params.sample_spec.duration_to_bytes(self.config.target_latency);
        let stream = TcpPlaybackStream::spawn(
            socket,
            params.sample_spec,
            target,
            params.flags.start_corked,
            self.events.clone(),
        )?;
        info!(
            "Stream '{}' opened ({}), {} bytes in flight at most",
            params.name, params.sample_spec, target
        );

        self.stream = Some(stream.clone());
        Ok(stream)
    }

    fn disconnect(&mut self) {
        self.link.cancelled.store(true, Ordering::SeqCst);

        if let Some(stream) = self.stream.take() {
            stream.disconnect();
        }
        if let Some(socket) = self.link.socket.lock().take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        if let Some(connector) = self.connector.take() {
            let _ = connector.join();
        }
        debug!("TCP transport disconnected");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Accepts `host`, `host:port`, `tcp:host[:port]` and bracketed IPv6
fn parse_server(server: &str) -> Result<String, TransportError> {
    let address = server.trim();
    let address = ["tcp:", "tcp4:", "tcp6:"]
        .iter()
        .find_map(|prefix| address.strip_prefix(prefix))
        .unwrap_or(address);

    if address.is_empty() || address.starts_with("unix:") || address.starts_with('/') {
        return Err(TransportError::ConnectFailed(format!(
            "unsupported server address '{}'",
            server
        )));
    }

    if address.parse::<SocketAddr>().is_ok() {
        return Ok(address.to_string());
    }
    let host = address.trim_start_matches('[').trim_end_matches(']');
    if host.contains(':') {
        // bare IPv6 literal or host:port
        if host.parse::<std::net::Ipv6Addr>().is_ok() {
            return Ok(format!("[{}]:{}", host, TCP_DEFAULT_PORT));
        }
        return Ok(address.to_string());
    }
    Ok(format!("{}:{}", host, TCP_DEFAULT_PORT))
}

fn resolve(address: &str) -> std::io::Result<Vec<SocketAddr>> {
    Ok(address.to_socket_addrs()?.collect())
}

fn open_socket(addr: &SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.set_keepalive(true)?;
    socket.connect_timeout(&SockAddr::from(*addr), timeout)?;
    Ok(socket.into())
}

fn try_connect(address: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_error = None;
    for addr in resolve(address)? {
        match open_socket(&addr, timeout) {
            Ok(socket) => return Ok(socket),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    }))
}

fn run_connector(
    address: &str,
    flags: ConnectFlags,
    config: &TcpConfig,
    link: &Link,
    events: &Sender<TransportEvent>,
) {
    let _ = events.send(TransportEvent::Context(ContextState::Connecting));

    loop {
        if link.cancelled.load(Ordering::SeqCst) {
            return;
        }

        match try_connect(address, config.connect_timeout) {
            Ok(socket) => {
                if link.cancelled.load(Ordering::SeqCst) {
                    let _ = socket.shutdown(Shutdown::Both);
                    return;
                }
                info!("Connected to {}", address);
                *link.socket.lock() = Some(socket);
                let _ = events.send(TransportEvent::Context(ContextState::SettingName));
                let _ = events.send(TransportEvent::Context(ContextState::Ready));
                return;
            }
            Err(e) if flags.no_fail => {
                debug!("Connection to {} failed, retrying: {}", address, e);
                thread::sleep(config.retry_interval);
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", address, e);
                let _ = events.send(TransportEvent::Context(ContextState::Failed));
                return;
            }
        }
    }
}

struct StreamInner {
    state: StreamState,
    corked: bool,
    in_flight: usize,
}

/// Playback stream backed by a writer thread
pub struct TcpPlaybackStream {
    inner: Mutex<StreamInner>,
    spec: SampleSpec,
    target: usize,
    queue: Mutex<Option<Sender<Vec<u8>>>>,
    socket: TcpStream,
    events: Sender<TransportEvent>,
    ready_tx: Sender<Readiness>,
    ready_rx: Receiver<Readiness>,
}

impl TcpPlaybackStream {
    fn spawn(
        socket: TcpStream,
        spec: SampleSpec,
        target: usize,
        corked: bool,
        events: Sender<TransportEvent>,
    ) -> Result<Arc<Self>, TransportError> {
        let writer_socket = socket
            .try_clone()
            .map_err(|e| TransportError::StreamCreation(e.to_string()))?;
        let (queue_tx, queue_rx) = bounded(TCP_WRITE_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = unbounded();

        let stream = Arc::new(Self {
            inner: Mutex::new(StreamInner {
                state: StreamState::Creating,
                corked,
                in_flight: 0,
            }),
            spec,
            target,
            queue: Mutex::new(Some(queue_tx)),
            socket,
            events,
            ready_tx,
            ready_rx,
        });

        let writer = stream.clone();
        thread::Builder::new()
            .name("tunnel-writer".to_string())
            .spawn(move || writer.run_writer(writer_socket, queue_rx))
            .map_err(|e| TransportError::StreamCreation(e.to_string()))?;

        Ok(stream)
    }

    fn set_state(&self, state: StreamState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = state;
        true
    }

    fn run_writer(self: Arc<Self>, mut socket: TcpStream, queue: Receiver<Vec<u8>>) {
        if self.set_state(StreamState::Ready) {
            let _ = self.events.send(TransportEvent::Stream(StreamState::Ready));
            let _ = self.ready_tx.send(Readiness::Writable);
        }

        while let Ok(data) = queue.recv() {
            if let Err(e) = socket.write_all(&data) {
                if self.set_state(StreamState::Failed) {
                    warn!("Stream write failed: {}", e);
                    let _ = self.events.send(TransportEvent::Stream(StreamState::Failed));
                    let _ = self.ready_tx.send(Readiness::Writable);
                }
                break;
            }

            {
                let mut inner = self.inner.lock();
                inner.in_flight = inner.in_flight.saturating_sub(data.len());
            }
            let _ = self.ready_tx.send(Readiness::Writable);
        }
        debug!("Stream writer exiting");
    }
}

impl PlaybackStream for TcpPlaybackStream {
    fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    fn is_corked(&self) -> bool {
        self.inner.lock().corked
    }

    fn cork(&self, corked: bool) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock();
            if !inner.state.is_good() {
                return Err(TransportError::CorkFailed(format!(
                    "stream is {:?}",
                    inner.state
                )));
            }
            inner.corked = corked;
        }
        if !corked {
            let _ = self.ready_tx.send(Readiness::Writable);
        }
        Ok(())
    }

    fn writable_size(&self) -> usize {
        let inner = self.inner.lock();
        if inner.state != StreamState::Ready {
            return 0;
        }
        let free = self.target.saturating_sub(inner.in_flight);
        free - free % self.spec.frame_size().max(1)
    }

    fn write(&self, data: &[u8], _seek: SeekMode) -> Result<(), TransportError> {
        if self.state() != StreamState::Ready {
            return Err(TransportError::NotReady);
        }

        let queue = self.queue.lock();
        let queue = queue.as_ref().ok_or(TransportError::Closed)?;

        self.inner.lock().in_flight += data.len();
        match queue.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(e) => {
                {
                    let mut inner = self.inner.lock();
                    inner.in_flight = inner.in_flight.saturating_sub(data.len());
                }
                Err(match e {
                    TrySendError::Full(_) => TransportError::WriteFailed("write queue full".into()),
                    TrySendError::Disconnected(_) => TransportError::Closed,
                })
            }
        }
    }

    fn latency(&self) -> Option<Latency> {
        let inner = self.inner.lock();
        if inner.state != StreamState::Ready {
            return None;
        }
        Some(Latency {
            usec: self.spec.bytes_to_duration(inner.in_flight).as_micros() as u64,
            negative: false,
        })
    }

    fn readiness(&self) -> Receiver<Readiness> {
        self.ready_rx.clone()
    }

    fn disconnect(&self) {
        self.set_state(StreamState::Terminated);
        // dropping the sender lets the writer drain and exit
        self.queue.lock().take();
        let _ = self.socket.shutdown(Shutdown::Write);
    }
}
