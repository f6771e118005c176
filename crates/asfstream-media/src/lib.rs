//! Asfstream-Media: ASF header parsing, stream selection and packet demultiplexing
//!
//! This crate understands the Advanced Systems Format container as it is
//! carried by MMS and MMSH streams and stored in `.asf`/`.wmv` files.
//!
//! # Modules
//!
//! - `guid` - GUID type and the table of known object GUIDs
//! - `header` - Header Object parsing (file, stream, bitrate, content, extension objects)
//! - `format` - WAVEFORMATEX / BITMAPINFOHEADER views and audio-spread parameters
//! - `select` - bandwidth-driven stream choice and bitrate masking
//! - `demux` - data packet parsing, fragment reassembly, keyframe resync and seeking
//! - `writer` - header, Data Object and packet serialization
//!
//! # Architecture
//!
//! A session starts from the raw Header Object. The parser records, for each
//! stream slot, where its bitrate sits in the buffer so a client can
//! [`disable_streams`] it in place before handing the header to a server.
//!
//! The [`AsfDemuxer`] then pulls fixed-size data packets from any
//! [`asfstream_common::InputSource`]:
//!
//! 1. Align on the packet boundary, or pick up a new Header Object
//! 2. Skip error correction data and parse the packet header
//! 3. Parse each payload header and check media object numbers
//! 4. Deliver fragments directly or reassemble and de-interleave them
//! 5. Report timestamp discontinuities as [`demux::DemuxEvent::NewPts`]

pub mod cursor;
pub mod demux;
pub mod error;
pub mod format;
pub mod guid;
pub mod header;
pub mod select;
pub mod writer;

pub use demux::{AsfDemuxer, DemuxConfig, DemuxEvent, DemuxMode, DemuxSink, DemuxStatus, SeekTarget};
pub use error::{Error, Result};
pub use guid::{Guid, ObjectKind, StreamType};
pub use header::{AsfHeader, HeaderParser};
pub use select::{choose_streams, disable_streams, StreamSelection};
pub use writer::{AsfFileBuilder, HeaderWriter, PacketWriter, StreamSpec};
