//! Sink configuration
//!
//! Loaded from a TOML file or from a module argument string such as
//! `sink_name=office remote_server=tcp:10.0.0.5 sink_properties='device.description="Office"'`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::audio::format::{ChannelMap, SampleSpec};
use crate::constants::DEFAULT_SINK_NAME;
use crate::error::{Error, Result};

/// Keys accepted in a module argument string
pub const VALID_MODULE_ARGS: &[&str] = &[
    "sink_name",
    "sink_properties",
    "remote_server",
    "format",
    "rate",
    "channels",
    "channel_map",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Name the sink is registered under
    pub sink_name: String,
    /// Extra device properties, overriding the built-in ones
    pub sink_properties: BTreeMap<String, String>,
    /// Address of the remote audio server; required
    pub remote_server: Option<String>,
    pub sample_spec: SampleSpec,
    /// Defaults to the standard layout for the channel count
    pub channel_map: Option<ChannelMap>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            sink_name: DEFAULT_SINK_NAME.to_string(),
            sink_properties: BTreeMap::new(),
            remote_server: None,
            sample_spec: SampleSpec::default(),
            channel_map: None,
        }
    }
}

impl TunnelConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tunnel-sink")
            .map(|dirs| dirs.config_dir().join("tunnel-sink.toml"))
    }

    /// Parse a whitespace separated `key=value` argument string
    pub fn from_module_args(args: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut channels_given = false;

        for (key, value) in parse_pairs(args).map_err(Error::Config)? {
            match key.as_str() {
                "sink_name" => config.sink_name = value,
                "remote_server" => config.remote_server = Some(value),
                "sink_properties" => {
                    for (k, v) in parse_pairs(&value)
                        .map_err(|e| Error::Config(format!("Invalid properties: {}", e)))?
                    {
                        config.sink_properties.insert(k, v);
                    }
                }
                "format" => config.sample_spec.format = value.parse().map_err(Error::Config)?,
                "rate" => {
                    config.sample_spec.rate = value
                        .parse()
                        .map_err(|_| Error::Config(format!("Invalid rate '{}'", value)))?
                }
                "channels" => {
                    channels_given = true;
                    config.sample_spec.channels = value
                        .parse()
                        .map_err(|_| Error::Config(format!("Invalid channel count '{}'", value)))?
                }
                "channel_map" => {
                    config.channel_map = Some(ChannelMap::parse(&value).map_err(Error::Config)?)
                }
                other => {
                    return Err(Error::Config(format!(
                        "Unknown module argument '{}', expected one of: {}",
                        other,
                        VALID_MODULE_ARGS.join(", ")
                    )));
                }
            }
        }

        // A channel map alone also determines the channel count
        if !channels_given {
            if let Some(map) = &config.channel_map {
                config.sample_spec.channels = map.channels() as u8;
            }
        }

        Ok(config)
    }

    /// Check the configuration and return the remote server address
    pub fn validate(&self) -> Result<&str> {
        let server = match self.remote_server.as_deref().map(str::trim) {
            Some(server) if !server.is_empty() => server,
            _ => return Err(Error::Config("No remote_server given".into())),
        };

        if !self.sample_spec.is_valid() {
            return Err(Error::Config(format!(
                "Invalid sample specification: {}",
                self.sample_spec
            )));
        }

        if let Some(map) = &self.channel_map {
            if !map.is_compatible(&self.sample_spec) {
                return Err(Error::Config(format!(
                    "Channel map has {} channels, sample spec has {}",
                    map.channels(),
                    self.sample_spec.channels
                )));
            }
        }

        Ok(server)
    }

    /// Configured channel map or the default layout
    pub fn channel_map(&self) -> ChannelMap {
        self.channel_map
            .clone()
            .unwrap_or_else(|| ChannelMap::default_for(self.sample_spec.channels))
    }
}

/// Split `a=1 b='x y' c="z"` into key/value pairs
fn parse_pairs(input: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        loop {
            match chars.next() {
                Some('=') => break,
                Some(c) if c.is_whitespace() => {
                    return Err(format!("missing '=' after '{}'", key));
                }
                Some(c) => key.push(c),
                None => return Err(format!("missing '=' after '{}'", key)),
            }
        }
        if key.is_empty() {
            return Err("empty key".into());
        }

        let mut value = String::new();
        match chars.peek().copied() {
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(format!("unterminated quote in value of '{}'", key)),
                    }
                }
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}
