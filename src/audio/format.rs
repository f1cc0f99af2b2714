//! Sample format and channel layout of the tunnelled sink

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::MAX_CHANNELS;

/// Sample encoding of the PCM bytes carried by the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16le,
    S16be,
    S32le,
    F32le,
    F32be,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16le | SampleFormat::S16be => 2,
            SampleFormat::S32le | SampleFormat::F32le | SampleFormat::F32be => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16le => "s16le",
            SampleFormat::S16be => "s16be",
            SampleFormat::S32le => "s32le",
            SampleFormat::F32le => "f32le",
            SampleFormat::F32be => "f32be",
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(SampleFormat::U8),
            "s16le" | "s16" => Ok(SampleFormat::S16le),
            "s16be" => Ok(SampleFormat::S16be),
            "s32le" | "s32" => Ok(SampleFormat::S32le),
            "f32le" | "float32le" | "f32" => Ok(SampleFormat::F32le),
            "f32be" | "float32be" => Ok(SampleFormat::F32be),
            other => Err(format!("unknown sample format '{}'", other)),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format, rate and channel count of the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16le,
            rate: crate::constants::DEFAULT_SAMPLE_RATE,
            channels: crate::constants::DEFAULT_CHANNELS,
        }
    }
}

impl SampleSpec {
    pub fn new(format: SampleFormat, rate: u32, channels: u8) -> Self {
        Self {
            format,
            rate,
            channels,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.rate > 0 && self.channels > 0 && self.channels as usize <= MAX_CHANNELS
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.rate as usize
    }

    /// Playback time of `bytes`, rounded down to whole frames
    pub fn bytes_to_duration(&self, bytes: usize) -> Duration {
        let frames = (bytes / self.frame_size()) as u64;
        Duration::from_micros(frames * 1_000_000 / self.rate as u64)
    }

    /// Byte length of `duration`, rounded down to whole frames
    pub fn duration_to_bytes(&self, duration: Duration) -> usize {
        let frames = duration.as_micros() as u64 * self.rate as u64 / 1_000_000;
        frames as usize * self.frame_size()
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}

/// Speaker position of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    Lfe,
    SideLeft,
    SideRight,
    Aux(u8),
}

impl FromStr for ChannelPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let position = match s {
            "mono" => ChannelPosition::Mono,
            "front-left" | "left" => ChannelPosition::FrontLeft,
            "front-right" | "right" => ChannelPosition::FrontRight,
            "front-center" | "center" => ChannelPosition::FrontCenter,
            "rear-left" => ChannelPosition::RearLeft,
            "rear-right" => ChannelPosition::RearRight,
            "lfe" | "subwoofer" => ChannelPosition::Lfe,
            "side-left" => ChannelPosition::SideLeft,
            "side-right" => ChannelPosition::SideRight,
            other => match other.strip_prefix("aux").map(str::parse::<u8>) {
                Some(Ok(n)) => ChannelPosition::Aux(n),
                _ => return Err(format!("unknown channel position '{}'", other)),
            },
        };
        Ok(position)
    }
}

/// Ordered channel positions of an interleaved frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// Default layout for a channel count
    pub fn default_for(channels: u8) -> Self {
        let positions = match channels {
            1 => vec![ChannelPosition::Mono],
            2 => vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
            3 => vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
            ],
            4 => vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::RearLeft,
                ChannelPosition::RearRight,
            ],
            6 => vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
                ChannelPosition::Lfe,
                ChannelPosition::RearLeft,
                ChannelPosition::RearRight,
            ],
            n => (0..n).map(ChannelPosition::Aux).collect(),
        };
        Self { positions }
    }

    /// Parse a comma separated list such as `front-left,front-right`
    pub fn parse(list: &str) -> Result<Self, String> {
        let positions = list
            .split(',')
            .map(|name| name.trim().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { positions })
    }

    pub fn channels(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    pub fn is_compatible(&self, spec: &SampleSpec) -> bool {
        self.channels() == spec.channels as usize
    }
}
