//! ASF data packet demultiplexer.
//!
//! [`AsfDemuxer`] pulls bytes from an [`InputSource`], parses the Header
//! Object, selects one audio and one video stream and then walks the data
//! packets one at a time, handing reassembled media objects to a
//! [`DemuxSink`].
//!
//! Payload delivery per stream is governed by two flags. `skip` drops
//! payloads, `resync` clears `skip` once a keyframe at or after the stored
//! keyframe timestamp shows up. A broken media object sequence on the video
//! stream sets both and waits for the next keyframe; a seek sets both on
//! every selected stream.

mod event;
mod packet;
mod reassembly;
mod reorder;
mod seek;

pub use event::{DemuxEvent, DemuxSink, Frame, MediaKind, StreamHeader, StreamInfo};
pub use reorder::deinterleave;
pub use seek::SeekTarget;

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::format::{ReorderParams, VideoInfo, WaveFormatEx};
use crate::guid::{Guid, ObjectKind, StreamType};
use crate::header::{AsfHeader, AsfStream, HeaderParser, StreamSlot, HEADER_OBJECT_PREFIX};
use crate::select::{choose_streams, StreamSelection};
use crate::writer::DATA_OBJECT_HEADER_SIZE;
use crate::{Error, Result};
use asfstream_common::{InputSource, Utf16Codec};

/// Capacity of the per-stream reassembly buffer.
pub const DEFRAG_BUFFER_SIZE: usize = 65_536;

/// Tunables for a demuxer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Largest frame chunk handed to the sink.
    pub max_chunk_size: usize,
    /// Largest Header Object accepted, prefix included.
    pub max_header_size: u64,
    pub text_codec: Utf16Codec,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 8192,
            max_header_size: 4 * 1024 * 1024,
            text_codec: Utf16Codec::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxMode {
    Normal,
    /// A stream is encrypted; no payloads are delivered.
    EncryptedContent,
    /// A stream referenced by the header has no Stream Properties.
    NoContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    Ok,
    Finished,
}

/// Per compact index reassembly and sequencing state.
#[derive(Debug, Default)]
struct StreamState {
    kind: Option<MediaKind>,
    number: u16,
    seq: u32,
    first_seq: bool,
    frag_offset: u32,
    payload_size: u32,
    /// Timestamp of the object being reassembled, in milliseconds.
    timestamp: i64,
    keyframe: bool,
    skip: bool,
    resync: bool,
    defrag: bool,
    reorder: ReorderParams,
    buffer: Vec<u8>,
    header: Option<StreamHeader>,
}

impl StreamState {
    fn new(slot: &StreamSlot, stream: &AsfStream) -> Self {
        let mut state = Self {
            number: stream.stream_number,
            first_seq: true,
            ..Default::default()
        };

        match stream.stream_type {
            StreamType::Audio => {
                if stream.error_correction_type == ObjectKind::AudioSpread {
                    state.reorder = ReorderParams::from_spread_data(&stream.error_correction_data);
                    debug!(
                        number = stream.stream_number,
                        width = state.reorder.width,
                        height = state.reorder.height,
                        block = state.reorder.block,
                        "audio interleave detected"
                    );
                }
                state.defrag = state.reorder.is_interleaved();
                if state.defrag {
                    state.buffer = vec![0; DEFRAG_BUFFER_SIZE];
                }

                let format = WaveFormatEx::parse(&stream.private_data).unwrap_or_else(|err| {
                    warn!(number = stream.stream_number, error = %err, "unreadable audio format");
                    WaveFormatEx::default()
                });
                state.kind = Some(MediaKind::Audio);
                state.header = Some(StreamHeader {
                    kind: MediaKind::Audio,
                    stream_number: stream.stream_number,
                    bitrate: slot.bitrate,
                    decoder_config: Bytes::copy_from_slice(&stream.private_data),
                    info: StreamInfo::Audio(format),
                });
            }
            StreamType::Video => {
                let header = match VideoInfo::parse(&stream.private_data) {
                    Ok(video) => {
                        let aspect = slot.aspect_ratio.is_set().then(|| {
                            (
                                i64::from(video.bitmap.width) * i64::from(slot.aspect_ratio.x),
                                i64::from(video.bitmap.height) * i64::from(slot.aspect_ratio.y),
                            )
                        });
                        StreamHeader {
                            kind: MediaKind::Video,
                            stream_number: stream.stream_number,
                            bitrate: slot.bitrate,
                            decoder_config: Bytes::from(video.decoder_config),
                            info: StreamInfo::Video {
                                width: video.width,
                                height: video.height,
                                fourcc: video.bitmap.compression,
                                aspect,
                            },
                        }
                    }
                    Err(err) => {
                        warn!(number = stream.stream_number, error = %err, "unreadable video format");
                        StreamHeader {
                            kind: MediaKind::Video,
                            stream_number: stream.stream_number,
                            bitrate: slot.bitrate,
                            decoder_config: Bytes::copy_from_slice(
                                stream.private_data.get(crate::format::VIDEO_INFO_PREFIX..).unwrap_or(&[]),
                            ),
                            info: StreamInfo::Video {
                                width: 0,
                                height: 0,
                                fourcc: Default::default(),
                                aspect: None,
                            },
                        }
                    }
                };
                state.kind = Some(MediaKind::Video);
                state.header = Some(header);
            }
            other => debug!(number = stream.stream_number, kind = %other, "stream not demuxed"),
        }
        state
    }

    fn reset_position(&mut self) {
        self.frag_offset = 0;
        self.first_seq = true;
        self.seq = 0;
        self.timestamp = 0;
    }
}

/// Geometry and cursor of the data packets.
#[derive(Debug, Default, Clone, Copy)]
struct PacketState {
    size: u32,
    count: u64,
    first_pos: u64,
    len_flags: u8,
    prop_flags: u8,
    frame_flag: u8,
    frames: u8,
    /// Bytes of payload data left in the current packet.
    size_left: i64,
}

/// Pull-model ASF demultiplexer.
pub struct AsfDemuxer<I> {
    input: I,
    config: DemuxConfig,
    header: Option<AsfHeader>,
    mode: DemuxMode,
    status: DemuxStatus,
    streams: Vec<StreamState>,
    selection: StreamSelection,
    packet: PacketState,
    keyframe_found: bool,
    keyframe_ts: i64,
    send_newpts: bool,
    buf_flag_seek: bool,
    /// Last nonzero pts per [`MediaKind::pts_slot`].
    last_pts: [i64; 2],
    length_ms: u64,
    byte_rate: u64,
    unknown_guids: HashSet<Guid>,
}

impl<I: InputSource> AsfDemuxer<I> {
    pub fn new(input: I, config: DemuxConfig) -> Self {
        Self {
            input,
            config,
            header: None,
            mode: DemuxMode::Normal,
            status: DemuxStatus::Finished,
            streams: Vec::new(),
            selection: StreamSelection::default(),
            packet: PacketState::default(),
            keyframe_found: false,
            keyframe_ts: 0,
            send_newpts: false,
            buf_flag_seek: false,
            last_pts: [0; 2],
            length_ms: 0,
            byte_rate: 0,
            unknown_guids: HashSet::new(),
        }
    }

    /// Read the header and announce the selected streams.
    ///
    /// A source that is not ASF, or whose header cannot be parsed, is an
    /// error. A header that references a missing stream leaves the demuxer
    /// finished in [`DemuxMode::NoContent`] without an error.
    pub fn start<S: DemuxSink>(&mut self, sink: &mut S) -> Result<()> {
        let sink: &mut dyn DemuxSink = sink;
        self.status = DemuxStatus::Ok;
        self.last_pts = [0; 2];
        self.send_newpts = true;

        if self.input.is_seekable() {
            self.input.seek(0)?;
        }

        let guid = self.read_guid()?;
        if guid != Guid::HEADER {
            self.status = DemuxStatus::Finished;
            return Err(Error::malformed(format!("source does not start with an ASF header ({guid})")));
        }

        if let Err(err) = self.open_header(sink) {
            self.status = DemuxStatus::Finished;
            if self.mode == DemuxMode::NoContent {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Demultiplex one data packet.
    pub fn next_packet<S: DemuxSink>(&mut self, sink: &mut S) -> DemuxStatus {
        let sink: &mut dyn DemuxSink = sink;
        if self.mode != DemuxMode::Normal || self.status == DemuxStatus::Finished {
            self.status = DemuxStatus::Finished;
            return self.status;
        }
        if let Err(err) = self.parse_packet(sink) {
            debug!(error = %err, "demux finished");
            self.status = DemuxStatus::Finished;
        }
        self.status
    }

    /// Demultiplex until the stream ends or `max_packets` packets were read.
    ///
    /// Returns the number of packets read.
    pub fn run<S: DemuxSink>(&mut self, sink: &mut S, max_packets: Option<u64>) -> u64 {
        let mut packets = 0;
        while max_packets.map_or(true, |max| packets < max) {
            if self.next_packet(sink) == DemuxStatus::Finished {
                break;
            }
            packets += 1;
        }
        packets
    }

    pub fn header(&self) -> Option<&AsfHeader> {
        self.header.as_ref()
    }

    pub fn selection(&self) -> StreamSelection {
        self.selection
    }

    pub fn mode(&self) -> DemuxMode {
        self.mode
    }

    pub fn status(&self) -> DemuxStatus {
        self.status
    }

    /// Stream length in milliseconds.
    pub fn length_ms(&self) -> u64 {
        self.length_ms
    }

    /// Average bytes per second, used to turn seek times into positions.
    pub fn byte_rate(&self) -> u64 {
        self.byte_rate
    }

    pub fn first_packet_pos(&self) -> u64 {
        self.packet.first_pos
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn into_inner(self) -> I {
        self.input
    }

    /// Read a header whose GUID was just consumed and announce its streams.
    fn open_header(&mut self, sink: &mut dyn DemuxSink) -> Result<()> {
        self.selection = StreamSelection::default();
        self.read_header()?;

        sink.deliver(DemuxEvent::Start);

        let Some(header) = self.header.as_ref() else {
            return Err(Error::MissingObject("header"));
        };
        self.selection = choose_streams(header, u32::MAX);
        info!(
            video = ?self.selection.video.and_then(|i| header.stream(i)).map(|s| s.stream_number),
            audio = ?self.selection.audio.and_then(|i| header.stream(i)).map(|s| s.stream_number),
            "selected streams"
        );

        for index in [self.selection.audio, self.selection.video].into_iter().flatten() {
            if let Some(stream_header) = self.streams.get(index).and_then(|s| s.header.clone()) {
                sink.deliver(DemuxEvent::StreamHeader(stream_header));
            }
        }
        Ok(())
    }

    /// Read the Header Object after its GUID, set up streams and skip the
    /// Data Object header.
    fn read_header(&mut self) -> Result<()> {
        let len = self.read_u64()?;
        if len > self.config.max_header_size {
            return Err(Error::malformed(format!("overly large header ({len} bytes)")));
        }
        let body_len = len
            .checked_sub(HEADER_OBJECT_PREFIX as u64)
            .ok_or_else(|| Error::malformed(format!("header length {len} below prefix size")))?;

        let mut body = vec![0u8; body_len as usize];
        self.read_exact(&mut body)?;
        let header = HeaderParser::with_codec(self.config.text_codec).parse(&body)?;

        if header.file.packet_size == 0 {
            return Err(Error::malformed("zero packet size"));
        }
        self.packet.size = header.file.packet_size;
        self.packet.count = header.file.data_packet_count;

        self.length_ms = header.length_ms();
        self.byte_rate = if header.file.max_bitrate != 0 {
            u64::from(header.file.max_bitrate >> 3)
        } else if self.length_ms != 0 {
            self.input.length().saturating_mul(1000) / self.length_ms
        } else {
            0
        };

        let mut streams = Vec::with_capacity(header.slots.len());
        let mut missing = false;
        for slot in &header.slots {
            let Some(stream) = &slot.stream else {
                if slot.bitrate_offset.is_some() || slot.extension.is_some() {
                    missing = true;
                    break;
                }
                streams.push(StreamState::default());
                continue;
            };
            if stream.encrypted && self.mode != DemuxMode::EncryptedContent {
                warn!(number = stream.stream_number, "stream is encrypted");
                self.mode = DemuxMode::EncryptedContent;
            }
            streams.push(StreamState::new(slot, stream));
        }

        info!(
            streams = header.stream_count(),
            packet_size = self.packet.size,
            packets = self.packet.count,
            length_ms = self.length_ms,
            "header parsed"
        );
        self.header = Some(header);
        self.streams = streams;

        if missing {
            if self.mode != DemuxMode::NoContent {
                warn!("a media stream appears to be missing");
                self.mode = DemuxMode::NoContent;
            }
            return Err(Error::unsupported("media stream missing"));
        }

        // Data Object GUID, length, file id, packet count and reserved bytes.
        self.skip(DATA_OBJECT_HEADER_SIZE as u64)?;
        self.packet.size_left = 0;
        self.packet.first_pos = self.input.position();
        Ok(())
    }

    fn note_unknown_guid(&mut self, guid: Guid) {
        if guid.kind() == ObjectKind::Error && self.unknown_guids.insert(guid) {
            debug!(%guid, "unknown GUID");
        }
    }

    fn media_kind(&self, index: usize) -> Option<MediaKind> {
        self.streams.get(index).and_then(|s| s.kind)
    }
}
