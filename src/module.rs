//! Control-thread side of a tunnel sink instance
//!
//! [`TunnelSinkModule::init`] registers the sink with the host, starts the
//! connection attempt and spawns the real-time thread. Transport events are
//! then fed in on the control thread, either one at a time through
//! [`TunnelSinkModule::handle_event`] or by [`TunnelSinkModule::run`].

use crossbeam_channel::{select, Receiver};
use std::collections::BTreeMap;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bridge::{thread_mq, ControlEndpoint, ControlMessage, SinkMessage};
use crate::config::TunnelConfig;
use crate::connection::{ConnectionStateMachine, ContextState, StreamState};
use crate::constants::{LATENCY_QUERY_TIMEOUT, RENDER_THREAD_NAME, STREAM_NAME};
use crate::error::{BridgeError, Result, StateError};
use crate::rt::{LoopStats, RenderLoop};
use crate::sink::{DeviceGraph, HostMessage, SinkAdapter, SinkDescriptor, SinkFlags};
use crate::transport::{
    BufferAttr, ConnectFlags, StreamFlags, StreamParams, Transport, TransportEvent,
};

/// Why [`TunnelSinkModule::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The real-time thread asked to be unloaded
    UnloadRequested,
    /// The stop channel fired or was closed
    Stopped,
    /// The transport stopped delivering events
    EventsClosed,
    /// The real-time thread exited on its own
    RenderThreadGone,
}

pub struct TunnelSinkModule<G: DeviceGraph> {
    graph: G,
    connection: ConnectionStateMachine,
    bridge: ControlEndpoint,
    thread: Option<JoinHandle<LoopStats>>,
    sink_name: String,
    linked: bool,
    sink_created: bool,
    stats: Option<LoopStats>,
}

impl<G: DeviceGraph> TunnelSinkModule<G> {
    pub fn init(config: &TunnelConfig, mut graph: G, transport: Box<dyn Transport>) -> Result<Self> {
        let server = config.validate()?.to_string();
        let channel_map = config.channel_map();

        let descriptor = SinkDescriptor {
            name: config.sink_name.clone(),
            driver: module_path!().to_string(),
            sample_spec: config.sample_spec,
            channel_map: channel_map.clone(),
            properties: sink_properties(config, &server),
            flags: SinkFlags {
                latency: true,
                dynamic_latency: true,
                network: true,
            },
        };

        let sink = graph.create_sink(&descriptor).map_err(|e| {
            error!("Failed to create sink: {}", e);
            e
        })?;

        let (control, rt) = thread_mq();
        let params = StreamParams {
            name: STREAM_NAME.to_string(),
            sample_spec: config.sample_spec,
            channel_map,
            buffer_attr: BufferAttr::unbounded(),
            flags: StreamFlags {
                start_corked: true,
                auto_timing_update: true,
            },
            properties: stream_properties(),
        };
        let mut connection = ConnectionStateMachine::new(transport, params, control.clone());

        let flags = ConnectFlags {
            no_fail: true,
            no_autospawn: true,
        };
        if let Err(e) = connection.connect(&server, flags) {
            error!("Failed to connect to {}: {}", server, e);
            connection.disconnect();
            graph.destroy();
            return Err(e.into());
        }

        let render = RenderLoop::new(SinkAdapter::new(sink), rt);
        let thread = match render.spawn(RENDER_THREAD_NAME) {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to spawn render thread: {}", e);
                connection.disconnect();
                graph.destroy();
                return Err(e.into());
            }
        };

        graph.link();
        info!("Tunnel sink '{}' created for {}", descriptor.name, server);

        Ok(Self {
            graph,
            connection,
            bridge: control,
            thread: Some(thread),
            sink_name: descriptor.name,
            linked: true,
            sink_created: true,
            stats: None,
        })
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    pub fn context_state(&self) -> ContextState {
        self.connection.context_state()
    }

    pub fn stream_state(&self) -> Option<StreamState> {
        self.connection.stream_state()
    }

    /// Apply one transport notification
    pub fn handle_event(&mut self, event: TransportEvent) -> std::result::Result<(), StateError> {
        self.connection.handle_event(event)
    }

    /// Current sink latency, answered by the real-time thread
    pub fn latency(&self) -> Result<Duration> {
        let latency = self
            .bridge
            .send(|reply| SinkMessage::GetLatency { reply }, LATENCY_QUERY_TIMEOUT)?;
        Ok(latency)
    }

    /// Forward a generic sink message to the host's render side
    pub fn post_host_message(&self, msg: HostMessage) -> Result<()> {
        self.bridge.post(SinkMessage::Host(msg))?;
        Ok(())
    }

    /// Drain messages from the real-time thread; true if it requested unload
    pub fn process_control_messages(&mut self) -> bool {
        let mut unload = false;
        while let Some(msg) = self.bridge.try_recv() {
            match msg {
                ControlMessage::UnloadModule => {
                    warn!("Render thread requested unload of '{}'", self.sink_name);
                    unload = true;
                }
            }
        }
        unload
    }

    /// Drive the module until it should stop
    pub fn run(&mut self, events: &Receiver<TransportEvent>, stop: &Receiver<()>) -> RunExit {
        let control = self.bridge.receiver().clone();

        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(event) {
                            warn!("Ignoring transport event: {}", e);
                        }
                    }
                    Err(_) => {
                        info!("Transport event channel closed");
                        return RunExit::EventsClosed;
                    }
                },
                recv(control) -> msg => match msg {
                    Ok(ControlMessage::UnloadModule) => {
                        warn!("Render thread requested unload of '{}'", self.sink_name);
                        return RunExit::UnloadRequested;
                    }
                    Err(_) => {
                        error!("Render thread exited unexpectedly");
                        return RunExit::RenderThreadGone;
                    }
                },
                recv(stop) -> _ => {
                    debug!("Stop requested");
                    return RunExit::Stopped;
                }
            }
        }
    }

    /// Tear everything down and return the real-time thread's counters
    pub fn done(mut self) -> Result<LoopStats> {
        self.teardown();
        // the thread is always joined here, so only a panic leaves no stats
        let stats = self.stats.take().ok_or(BridgeError::ThreadPanicked)?;
        Ok(stats)
    }

    fn teardown(&mut self) {
        if self.linked {
            self.graph.unlink();
            self.linked = false;
        }

        if let Some(thread) = self.thread.take() {
            if let Err(e) = self.bridge.shutdown() {
                debug!("Render thread already gone: {}", e);
            }
            match thread.join() {
                Ok(stats) => self.stats = Some(stats),
                Err(_) => error!("{}", BridgeError::ThreadPanicked),
            }
        }

        self.connection.disconnect();

        if self.sink_created {
            self.graph.destroy();
            self.sink_created = false;
            info!("Tunnel sink '{}' removed", self.sink_name);
        }
    }
}

impl<G: DeviceGraph> Drop for TunnelSinkModule<G> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn sink_properties(config: &TunnelConfig, server: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    properties.insert("device.class".to_string(), "abstract".to_string());
    properties.insert(
        "device.description".to_string(),
        format!("Remote sink of {}", server),
    );
    properties.extend(
        config
            .sink_properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    properties
}

fn stream_properties() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("application.name".to_string(), STREAM_NAME.to_string()),
        ("application.id".to_string(), env!("CARGO_PKG_NAME").to_string()),
        (
            "application.version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        ("media.role".to_string(), "abstract".to_string()),
    ])
}
