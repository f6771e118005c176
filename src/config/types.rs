use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use asfstream_common::{BandwidthPreset, Protocol, Utf16Codec};
use asfstream_media::DemuxConfig;
use asfstream_net::{SessionConfig, TransportConfig};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub demux: DemuxSettings,
}

impl Config {
    /// Settings for MMS and MMSH sessions.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            bandwidth: self.network.bandwidth(),
            protocol: self.network.protocol,
            transport: self.network.transport(),
            client_guid: self.network.client_guid,
            text_codec: self.demux.text_codec,
        }
    }

    pub fn demux_config(&self) -> DemuxConfig {
        DemuxConfig {
            max_chunk_size: self.demux.max_chunk_size,
            max_header_size: self.demux.max_header_size,
            text_codec: self.demux.text_codec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Connection speed used to pick streams when `bandwidth` is unset.
    #[serde(default)]
    pub bandwidth_preset: BandwidthPreset,

    /// Explicit bandwidth in bits per second, overrides the preset.
    #[serde(default)]
    pub bandwidth: Option<u32>,

    /// Transport for `mms://` locations.
    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// 0 disables the read timeout.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Client GUID sent to servers. Random per session when unset.
    #[serde(default)]
    pub client_guid: Option<Uuid>,
}

fn default_connect_timeout() -> u64 {
    15_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_read_timeout() -> u64 {
    30_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bandwidth_preset: BandwidthPreset::default(),
            bandwidth: None,
            protocol: Protocol::default(),
            connect_timeout_ms: default_connect_timeout(),
            poll_interval_ms: default_poll_interval(),
            read_timeout_ms: default_read_timeout(),
            client_guid: None,
        }
    }
}

impl NetworkConfig {
    /// Effective bandwidth in bits per second.
    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
            .unwrap_or_else(|| self.bandwidth_preset.bits_per_second())
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_timeout: (self.read_timeout_ms != 0).then(|| Duration::from_millis(self.read_timeout_ms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DemuxSettings {
    /// Largest frame chunk handed to a consumer.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Largest Header Object accepted from a file.
    #[serde(default = "default_max_header_size")]
    pub max_header_size: u64,

    /// Decoding of UTF-16 content strings and metadata names.
    #[serde(default)]
    pub text_codec: Utf16Codec,
}

fn default_max_chunk_size() -> usize {
    8192
}

fn default_max_header_size() -> u64 {
    4 * 1024 * 1024
}

impl Default for DemuxSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            max_header_size: default_max_header_size(),
            text_codec: Utf16Codec::default(),
        }
    }
}
