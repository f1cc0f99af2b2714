//! Interfaces of the host audio-routing framework
//!
//! The host owns the sink device. On the control thread it is driven through
//! [`DeviceGraph`]; the render side, [`SinkHost`], is moved to the real-time
//! thread when the sink is created.

use std::collections::BTreeMap;

use crate::audio::chunk::AudioChunk;
use crate::audio::format::{ChannelMap, SampleSpec};
use crate::error::SinkError;

/// Device state as seen from the real-time thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkState {
    Init,
    Idle,
    Running,
    Suspended,
    Unlinked,
}

impl SinkState {
    /// Part of the host's device graph
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            SinkState::Idle | SinkState::Running | SinkState::Suspended
        )
    }

    /// Linked and not suspended
    pub fn is_opened(self) -> bool {
        matches!(self, SinkState::Idle | SinkState::Running)
    }
}

/// Generic sink control codes owned by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    SetState(SinkState),
    Custom { code: u32, offset: i64 },
}

/// Description of the sink to register with the host
#[derive(Debug, Clone, PartialEq)]
pub struct SinkDescriptor {
    pub name: String,
    pub driver: String,
    pub sample_spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub properties: BTreeMap<String, String>,
    pub flags: SinkFlags,
}

/// Capabilities advertised for the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkFlags {
    pub latency: bool,
    pub dynamic_latency: bool,
    pub network: bool,
}

/// Render side of a host sink, driven from the real-time thread
pub trait SinkHost: Send {
    /// Produce up to `length` bytes of mixed audio; must not block
    fn render(&mut self, length: usize) -> AudioChunk;

    fn rewind_requested(&self) -> bool;

    fn process_rewind(&mut self, amount: usize);

    fn state(&self) -> SinkState;

    /// Generic message handler for codes the tunnel does not intercept
    fn process_msg(&mut self, msg: HostMessage);
}

/// Device-graph lifecycle hooks, each invoked once
pub trait DeviceGraph {
    type Sink: SinkHost + 'static;

    fn create_sink(&mut self, descriptor: &SinkDescriptor) -> Result<Self::Sink, SinkError>;

    fn link(&mut self);

    fn unlink(&mut self);

    fn destroy(&mut self);
}
