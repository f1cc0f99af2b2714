//! Tunnel Sink Application
//!
//! Plays a test tone into a tunnel sink connected to a remote server over
//! raw TCP. The first argument is either a config file path or a module
//! argument string such as `remote_server=10.0.0.5 rate=48000`.

use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::f32::consts::TAU;
use std::sync::Arc;

use tunnel_sink::{
    audio::{AudioChunk, SampleFormat, SampleSpec},
    error::SinkError,
    sink::{DeviceGraph, HostMessage, SinkDescriptor, SinkHost, SinkState},
    transport::TcpTransport,
    TunnelConfig, TunnelSinkModule,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.2;

/// Render side producing a continuous sine wave
struct ToneHost {
    spec: SampleSpec,
    phase: f32,
    state: Arc<Mutex<SinkState>>,
}

impl ToneHost {
    fn push_sample(&self, value: f32, out: &mut Vec<u8>) {
        match self.spec.format {
            SampleFormat::U8 => out.push(((value * 127.0) + 128.0) as u8),
            SampleFormat::S16le => out.extend_from_slice(&((value * 32767.0) as i16).to_le_bytes()),
            SampleFormat::S16be => out.extend_from_slice(&((value * 32767.0) as i16).to_be_bytes()),
            SampleFormat::S32le => {
                out.extend_from_slice(&((value * 2_147_483_647.0) as i32).to_le_bytes())
            }
            SampleFormat::F32le => out.extend_from_slice(&value.to_le_bytes()),
            SampleFormat::F32be => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

impl SinkHost for ToneHost {
    fn render(&mut self, length: usize) -> AudioChunk {
        let frame_size = self.spec.frame_size();
        let frames = length / frame_size;
        let step = TAU * TONE_HZ / self.spec.rate as f32;

        let mut data = Vec::with_capacity(frames * frame_size);
        for _ in 0..frames {
            let value = self.phase.sin() * TONE_AMPLITUDE;
            for _ in 0..self.spec.channels {
                self.push_sample(value, &mut data);
            }
            self.phase = (self.phase + step) % TAU;
        }

        AudioChunk::from_block(Bytes::from(data))
    }

    fn rewind_requested(&self) -> bool {
        false
    }

    fn process_rewind(&mut self, _amount: usize) {}

    fn state(&self) -> SinkState {
        *self.state.lock()
    }

    fn process_msg(&mut self, msg: HostMessage) {
        if let HostMessage::SetState(state) = msg {
            *self.state.lock() = state;
        }
    }
}

/// Minimal device graph: a single tone sink
struct ToneGraph {
    state: Arc<Mutex<SinkState>>,
}

impl DeviceGraph for ToneGraph {
    type Sink = ToneHost;

    fn create_sink(&mut self, descriptor: &SinkDescriptor) -> Result<ToneHost, SinkError> {
        if descriptor.sample_spec.frame_size() == 0 {
            return Err(SinkError::CreateFailed("empty frame size".into()));
        }
        tracing::info!(
            "Sink '{}' ({}) created: {}",
            descriptor.name,
            descriptor
                .properties
                .get("device.description")
                .map(String::as_str)
                .unwrap_or(""),
            descriptor.sample_spec
        );
        Ok(ToneHost {
            spec: descriptor.sample_spec,
            phase: 0.0,
            state: self.state.clone(),
        })
    }

    fn link(&mut self) {
        *self.state.lock() = SinkState::Running;
    }

    fn unlink(&mut self) {
        *self.state.lock() = SinkState::Unlinked;
    }

    fn destroy(&mut self) {
        tracing::debug!("Sink destroyed");
    }
}

fn load_config() -> Result<TunnelConfig> {
    match std::env::args().nth(1) {
        Some(arg) if arg.contains('=') => Ok(TunnelConfig::from_module_args(&arg)?),
        Some(path) => Ok(TunnelConfig::load(&path)?),
        None => match TunnelConfig::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Ok(TunnelConfig::load(&path)?)
            }
            _ => Ok(TunnelConfig::default()),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting tunnel sink");

    let config = load_config()?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let graph = ToneGraph {
        state: Arc::new(Mutex::new(SinkState::Init)),
    };
    let mut module = TunnelSinkModule::init(&config, graph, Box::new(TcpTransport::new(event_tx)))?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let mut control = tokio::task::spawn_blocking(move || {
        let exit = module.run(&event_rx, &stop_rx);
        (exit, module.done())
    });

    let (exit, stats) = tokio::select! {
        result = &mut control => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down");
            let _ = stop_tx.send(());
            control.await?
        }
    };

    tracing::info!("Tunnel sink stopped: {:?}", exit);
    let stats = stats?;
    tracing::info!(
        "Rendered {} chunks, wrote {} bytes, {} write failures",
        stats.chunks_rendered,
        stats.bytes_written,
        stats.write_failures
    );

    Ok(())
}
