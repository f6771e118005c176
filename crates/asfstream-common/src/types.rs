//! Core type definitions shared by the network and media layers.
//!
//! Enums are serialized in kebab-case so they read naturally in TOML
//! configuration files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport used for `mms://` locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Try MMS over TCP first, then fall back to MMS over HTTP.
    #[default]
    Auto,
    /// MMS over raw TCP.
    Tcp,
    /// MMS tunneled over HTTP.
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Tcp => write!(f, "tcp"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Connection speed presets offered to users who do not know their bitrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandwidthPreset {
    Modem14k,
    Modem19k,
    Modem28k,
    Modem33k,
    Modem34k,
    Modem57k,
    Isdn,
    Dsl262k,
    Dsl393k,
    Dsl524k,
    #[default]
    T1,
    Lan,
}

impl BandwidthPreset {
    /// All presets, slowest first.
    pub const ALL: [BandwidthPreset; 12] = [
        Self::Modem14k,
        Self::Modem19k,
        Self::Modem28k,
        Self::Modem33k,
        Self::Modem34k,
        Self::Modem57k,
        Self::Isdn,
        Self::Dsl262k,
        Self::Dsl393k,
        Self::Dsl524k,
        Self::T1,
        Self::Lan,
    ];

    /// Bandwidth in bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Self::Modem14k => 14_400,
            Self::Modem19k => 19_200,
            Self::Modem28k => 28_800,
            Self::Modem33k => 33_600,
            Self::Modem34k => 34_430,
            Self::Modem57k => 57_600,
            Self::Isdn => 115_200,
            Self::Dsl262k => 262_200,
            Self::Dsl393k => 393_216,
            Self::Dsl524k => 524_300,
            Self::T1 => 1_544_000,
            Self::Lan => 10_485_800,
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Modem14k => "14.4 Kbps (Modem)",
            Self::Modem19k => "19.2 Kbps (Modem)",
            Self::Modem28k => "28.8 Kbps (Modem)",
            Self::Modem33k => "33.6 Kbps (Modem)",
            Self::Modem34k => "34.4 Kbps (Modem)",
            Self::Modem57k => "57.6 Kbps (Modem)",
            Self::Isdn => "115.2 Kbps (ISDN)",
            Self::Dsl262k => "262.2 Kbps (Cable/DSL)",
            Self::Dsl393k => "393.2 Kbps (Cable/DSL)",
            Self::Dsl524k => "524.3 Kbps (Cable/DSL)",
            Self::T1 => "1.5 Mbps (T1)",
            Self::Lan => "10.5 Mbps (LAN)",
        }
    }

    /// Look up a preset by its position in [`BandwidthPreset::ALL`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for BandwidthPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
