//! ASF header model.
//!
//! An [`AsfHeader`] is built from the bytes of a Header Object (without its
//! 24-byte GUID and length prefix). Streams are stored in slots addressed by a
//! compact index that is assigned the first time a wire stream number shows
//! up in any object, so file properties, stream properties, bitrates,
//! extensions and aspect-ratio metadata for one stream all land in one slot.

mod content;
mod extension;
mod metadata;
mod parser;

pub use parser::{HeaderParser, HEADER_OBJECT_PREFIX};

use crate::guid::{Guid, ObjectKind, StreamType};
use asfstream_common::Utf16Codec;

/// Largest number of distinct wire stream numbers a header can track.
pub const MAX_STREAMS: usize = 23;

/// File Properties object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AsfFile {
    pub file_id: Guid,
    pub file_size: u64,
    pub data_packet_count: u64,
    /// 100ns units.
    pub play_duration: u64,
    /// 100ns units.
    pub send_duration: u64,
    /// Milliseconds, despite the 64-bit field.
    pub preroll: u64,
    pub packet_size: u32,
    pub max_bitrate: u32,
    pub broadcast: bool,
    pub seekable: bool,
}

/// Stream Properties object.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AsfStream {
    pub stream_number: u16,
    pub stream_type: StreamType,
    pub error_correction_type: ObjectKind,
    pub time_offset: u64,
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub private_data: Vec<u8>,
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub error_correction_data: Vec<u8>,
    pub encrypted: bool,
}

/// Extended Stream Properties object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct StreamExtension {
    pub start_time: u64,
    pub end_time: u64,
    pub data_bitrate: u32,
    pub buffer_size: u32,
    pub initial_buffer_fullness: u32,
    pub alternate_data_bitrate: u32,
    pub alternate_buffer_size: u32,
    pub alternate_initial_buffer_fullness: u32,
    pub max_object_size: u32,
    pub reliable: bool,
    pub seekable: bool,
    pub no_cleanpoints: bool,
    pub resend_live_cleanpoints: bool,
    pub language_id: u16,
    pub average_time_per_frame: u64,
    pub stream_names: Vec<String>,
    pub payload_extension_count: u16,
}

/// Content Description object. Absent strings are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AsfContent {
    pub title: Option<String>,
    pub author: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub rating: Option<String>,
}

impl AsfContent {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Pixel aspect ratio from the Metadata object. Zero means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AspectRatio {
    pub x: u32,
    pub y: u32,
}

impl AspectRatio {
    pub fn is_set(&self) -> bool {
        self.x != 0 && self.y != 0
    }
}

/// Everything known about one compact stream index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct StreamSlot {
    /// Wire stream number that owns this slot.
    pub number: u16,
    pub stream: Option<AsfStream>,
    pub extension: Option<StreamExtension>,
    pub bitrate: u32,
    pub aspect_ratio: AspectRatio,
    /// Offset of the bitrate field inside the buffer given to the parser.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub bitrate_offset: Option<usize>,
}

/// A parsed ASF header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AsfHeader {
    pub file: AsfFile,
    pub content: AsfContent,
    pub slots: Vec<StreamSlot>,
}

impl AsfHeader {
    /// Parse Header Object contents with the default text codec.
    pub fn parse(buffer: &[u8]) -> crate::Result<Self> {
        HeaderParser::new().parse(buffer)
    }

    /// Parse Header Object contents, decoding strings with `codec`.
    pub fn parse_with(buffer: &[u8], codec: Utf16Codec) -> crate::Result<Self> {
        HeaderParser::with_codec(codec).parse(buffer)
    }

    /// Number of slots that carry Stream Properties.
    pub fn stream_count(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }

    pub fn stream(&self, index: usize) -> Option<&AsfStream> {
        self.slots.get(index).and_then(|s| s.stream.as_ref())
    }

    pub fn bitrate(&self, index: usize) -> u32 {
        self.slots.get(index).map_or(0, |s| s.bitrate)
    }

    pub fn aspect_ratio(&self, index: usize) -> AspectRatio {
        self.slots
            .get(index)
            .map(|s| s.aspect_ratio)
            .unwrap_or_default()
    }

    /// Iterate over slots that have Stream Properties, with their compact index.
    pub fn streams(&self) -> impl Iterator<Item = (usize, &AsfStream)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.stream.as_ref().map(|st| (i, st)))
    }

    /// Compact index of a wire stream number.
    pub fn index_of(&self, stream_number: u16) -> Option<usize> {
        self.slots.iter().position(|s| s.number == stream_number)
    }

    /// Stream length in milliseconds, floored at zero.
    ///
    /// The preroll is subtracted from the send duration before scaling.
    pub fn length_ms(&self) -> u64 {
        self.file.send_duration.saturating_sub(self.file.preroll) / 10_000
    }
}
