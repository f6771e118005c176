//! ASF serialization: Header Object, Data Object header and data packets.
//!
//! The writer produces the subset of the format that the parser and the
//! demuxer consume. It is used to build synthetic files and to answer
//! protocol requests from loopback test servers.

use bytes::{BufMut, BytesMut};

use crate::guid::{Guid, StreamType};
use crate::header::{AsfContent, AsfFile, AspectRatio, StreamExtension, HEADER_OBJECT_PREFIX};
use crate::{Error, Result};
use asfstream_common::text::encode_utf16le;

/// Size of the Data Object header that precedes the first packet.
pub const DATA_OBJECT_HEADER_SIZE: usize = 50;

/// Bytes of packet header written by [`PacketWriter`] before the first payload.
const PACKET_HEADER_SIZE: usize = 13;

/// Per-payload header of a single fragment payload (without the length field).
const FRAGMENT_PAYLOAD_HEADER: usize = 15;

/// One stream to describe in a written header.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub number: u16,
    pub stream_type: StreamType,
    pub error_correction: Guid,
    pub private_data: Vec<u8>,
    pub error_correction_data: Vec<u8>,
    pub encrypted: bool,
    /// Written to Stream Bitrate Properties when nonzero.
    pub bitrate: u32,
    pub aspect_ratio: AspectRatio,
    pub extension: Option<StreamExtension>,
    /// Carry Stream Properties inside the Extended Stream Properties object.
    pub embedded: bool,
}

impl StreamSpec {
    pub fn new(number: u16, stream_type: StreamType) -> Self {
        Self {
            number,
            stream_type,
            error_correction: Guid::NO_ERROR_CORRECTION,
            private_data: Vec::new(),
            error_correction_data: Vec::new(),
            encrypted: false,
            bitrate: 0,
            aspect_ratio: AspectRatio::default(),
            extension: None,
            embedded: false,
        }
    }

    pub fn private_data(mut self, data: Vec<u8>) -> Self {
        self.private_data = data;
        self
    }

    pub fn error_correction(mut self, guid: Guid, data: Vec<u8>) -> Self {
        self.error_correction = guid;
        self.error_correction_data = data;
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn aspect_ratio(mut self, x: u32, y: u32) -> Self {
        self.aspect_ratio = AspectRatio { x, y };
        self
    }

    pub fn extension(mut self, extension: StreamExtension) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Write Stream Properties only as the trailer of the Extended Stream
    /// Properties object. Has no effect without an extension.
    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    fn is_embedded(&self) -> bool {
        self.embedded && self.extension.is_some()
    }
}

/// Builder for a Header Object.
#[derive(Debug, Clone, Default)]
pub struct HeaderWriter {
    file: AsfFile,
    content: AsfContent,
    streams: Vec<StreamSpec>,
}

impl HeaderWriter {
    pub fn new(file: AsfFile) -> Self {
        Self {
            file,
            ..Default::default()
        }
    }

    pub fn content(mut self, content: AsfContent) -> Self {
        self.content = content;
        self
    }

    pub fn stream(mut self, stream: StreamSpec) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn file_mut(&mut self) -> &mut AsfFile {
        &mut self.file
    }

    /// The complete Header Object including its GUID and length.
    pub fn build(&self) -> Vec<u8> {
        let body = self.build_body();
        let mut buf = BytesMut::with_capacity(HEADER_OBJECT_PREFIX + body.len());
        buf.put_slice(&Guid::HEADER.to_bytes());
        buf.put_u64_le((HEADER_OBJECT_PREFIX + body.len()) as u64);
        buf.put_slice(&body);
        buf.to_vec()
    }

    /// The Header Object without its 24-byte prefix, as accepted by the parser.
    pub fn build_body(&self) -> Vec<u8> {
        let mut objects = BytesMut::with_capacity(1024);
        let mut count = 0u32;

        put_object(&mut objects, Guid::FILE_PROPERTIES, |b| self.write_file_properties(b));
        count += 1;

        if self.streams.iter().any(|s| s.extension.is_some() || s.aspect_ratio != AspectRatio::default()) {
            put_object(&mut objects, Guid::HEADER_EXTENSION, |b| self.write_header_extension(b));
            count += 1;
        }

        for stream in self.streams.iter().filter(|s| !s.is_embedded()) {
            put_object(&mut objects, Guid::STREAM_PROPERTIES, |b| write_stream_properties(b, stream));
            count += 1;
        }

        if self.streams.iter().any(|s| s.bitrate != 0) {
            put_object(&mut objects, Guid::STREAM_BITRATE_PROPERTIES, |b| self.write_bitrates(b));
            count += 1;
        }

        if !self.content.is_empty() {
            put_object(&mut objects, Guid::CONTENT_DESCRIPTION, |b| self.write_content(b));
            count += 1;
        }

        let mut buf = BytesMut::with_capacity(6 + objects.len());
        buf.put_u32_le(count);
        buf.put_u8(0x01);
        buf.put_u8(0x02);
        buf.put_slice(&objects);
        buf.to_vec()
    }

    fn write_file_properties(&self, buf: &mut BytesMut) {
        let f = &self.file;
        buf.put_slice(&f.file_id.to_bytes());
        buf.put_u64_le(f.file_size);
        buf.put_u64_le(0); // creation date
        buf.put_u64_le(f.data_packet_count);
        buf.put_u64_le(f.play_duration);
        buf.put_u64_le(f.send_duration);
        buf.put_u64_le(f.preroll);
        buf.put_u32_le(u32::from(f.broadcast) | u32::from(f.seekable) << 1);
        buf.put_u32_le(f.packet_size);
        buf.put_u32_le(f.packet_size);
        buf.put_u32_le(f.max_bitrate);
    }

    fn write_header_extension(&self, buf: &mut BytesMut) {
        let mut nested = BytesMut::new();
        for stream in &self.streams {
            if let Some(ext) = &stream.extension {
                put_object(&mut nested, Guid::EXTENDED_STREAM_PROPERTIES, |b| {
                    write_extended_stream_properties(b, stream.number, ext);
                    if stream.is_embedded() {
                        put_object(b, Guid::STREAM_PROPERTIES, |b| write_stream_properties(b, stream));
                    }
                });
            }
        }

        let aspect: Vec<_> = self
            .streams
            .iter()
            .filter(|s| s.aspect_ratio != AspectRatio::default())
            .collect();
        if !aspect.is_empty() {
            put_object(&mut nested, Guid::METADATA, |b| {
                b.put_u16_le((aspect.len() * 2) as u16);
                for stream in &aspect {
                    put_metadata_dword(b, stream.number, "AspectRatioX", stream.aspect_ratio.x);
                    put_metadata_dword(b, stream.number, "AspectRatioY", stream.aspect_ratio.y);
                }
            });
        }

        buf.put_slice(&Guid::RESERVED_1.to_bytes());
        buf.put_u16_le(6);
        buf.put_u32_le(nested.len() as u32);
        buf.put_slice(&nested);
    }

    fn write_bitrates(&self, buf: &mut BytesMut) {
        let entries: Vec<_> = self.streams.iter().filter(|s| s.bitrate != 0).collect();
        buf.put_u16_le(entries.len() as u16);
        for stream in entries {
            buf.put_u16_le(stream.number & 0x7F);
            buf.put_u32_le(stream.bitrate);
        }
    }

    fn write_content(&self, buf: &mut BytesMut) {
        let c = &self.content;
        let fields = [&c.title, &c.author, &c.copyright, &c.description, &c.rating];
        let encoded: Vec<Vec<u8>> = fields
            .iter()
            .map(|s| s.as_deref().map(terminated_utf16).unwrap_or_default())
            .collect();
        for e in &encoded {
            buf.put_u16_le(e.len() as u16);
        }
        for e in &encoded {
            buf.put_slice(e);
        }
    }
}

/// Write an object: GUID, patched 64-bit length, body produced by `f`.
fn put_object(buf: &mut BytesMut, guid: Guid, f: impl FnOnce(&mut BytesMut)) {
    let start = buf.len();
    buf.put_slice(&guid.to_bytes());
    buf.put_u64_le(0); // placeholder
    f(buf);
    let len = (buf.len() - start) as u64;
    buf[start + 16..start + 24].copy_from_slice(&len.to_le_bytes());
}

fn terminated_utf16(text: &str) -> Vec<u8> {
    let mut raw = encode_utf16le(text);
    raw.extend_from_slice(&[0, 0]);
    raw
}

fn write_stream_properties(buf: &mut BytesMut, stream: &StreamSpec) {
    let type_guid = stream.stream_type.guid().unwrap_or_default();
    buf.put_slice(&type_guid.to_bytes());
    buf.put_slice(&stream.error_correction.to_bytes());
    buf.put_u64_le(0); // time offset
    buf.put_u32_le(stream.private_data.len() as u32);
    buf.put_u32_le(stream.error_correction_data.len() as u32);
    let flags = (stream.number & 0x7F) | if stream.encrypted { 0x8000 } else { 0 };
    buf.put_u16_le(flags);
    buf.put_u32_le(0); // reserved
    buf.put_slice(&stream.private_data);
    buf.put_slice(&stream.error_correction_data);
}

fn write_extended_stream_properties(buf: &mut BytesMut, number: u16, ext: &StreamExtension) {
    buf.put_u64_le(ext.start_time);
    buf.put_u64_le(ext.end_time);
    buf.put_u32_le(ext.data_bitrate);
    buf.put_u32_le(ext.buffer_size);
    buf.put_u32_le(ext.initial_buffer_fullness);
    buf.put_u32_le(ext.alternate_data_bitrate);
    buf.put_u32_le(ext.alternate_buffer_size);
    buf.put_u32_le(ext.alternate_initial_buffer_fullness);
    buf.put_u32_le(ext.max_object_size);
    let flags = u32::from(ext.reliable)
        | u32::from(ext.seekable) << 1
        | u32::from(ext.no_cleanpoints) << 2
        | u32::from(ext.resend_live_cleanpoints) << 3;
    buf.put_u32_le(flags);
    buf.put_u16_le(number);
    buf.put_u16_le(ext.language_id);
    buf.put_u64_le(ext.average_time_per_frame);
    buf.put_u16_le(ext.stream_names.len() as u16);
    buf.put_u16_le(0); // payload extension systems
    for name in &ext.stream_names {
        let raw = terminated_utf16(name);
        buf.put_u16_le(0);
        buf.put_u16_le(raw.len() as u16);
        buf.put_slice(&raw);
    }
}

fn put_metadata_dword(buf: &mut BytesMut, stream: u16, name: &str, value: u32) {
    let raw = terminated_utf16(name);
    buf.put_u16_le(0);
    buf.put_u16_le(stream);
    buf.put_u16_le(raw.len() as u16);
    buf.put_u16_le(3); // DWORD
    buf.put_u32_le(4);
    buf.put_slice(&raw);
    buf.put_u32_le(value);
}

/// The 50-byte Data Object header.
///
/// The declared length assumes exactly `packet_count` packets of `packet_size` bytes follow.
pub fn data_object_header(file_id: Guid, packet_count: u64, packet_size: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(DATA_OBJECT_HEADER_SIZE);
    buf.put_slice(&Guid::DATA.to_bytes());
    buf.put_u64_le(DATA_OBJECT_HEADER_SIZE as u64 + packet_count * u64::from(packet_size));
    buf.put_slice(&file_id.to_bytes());
    buf.put_u64_le(packet_count);
    buf.put_u8(0x01);
    buf.put_u8(0x01);
    buf.to_vec()
}

/// Body of one payload inside a data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    /// A fragment of a media object.
    Fragment {
        object_size: u32,
        offset: u32,
        /// Wire timestamp in milliseconds, preroll included.
        pts: u32,
        data: Vec<u8>,
    },
    /// Several small media objects sharing one timestamp.
    Grouped {
        pts: u32,
        delta: u8,
        objects: Vec<Vec<u8>>,
    },
}

/// One payload: stream number, keyframe flag, media object number and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub stream: u8,
    pub keyframe: bool,
    pub seq: u8,
    pub body: PayloadBody,
}

impl Payload {
    /// A complete media object in one fragment.
    pub fn object(stream: u8, seq: u8, pts: u32, data: Vec<u8>) -> Self {
        Self {
            stream,
            keyframe: false,
            seq,
            body: PayloadBody::Fragment {
                object_size: data.len() as u32,
                offset: 0,
                pts,
                data,
            },
        }
    }

    pub fn fragment(stream: u8, seq: u8, object_size: u32, offset: u32, pts: u32, data: Vec<u8>) -> Self {
        Self {
            stream,
            keyframe: false,
            seq,
            body: PayloadBody::Fragment {
                object_size,
                offset,
                pts,
                data,
            },
        }
    }

    pub fn grouped(stream: u8, seq: u8, pts: u32, objects: Vec<Vec<u8>>) -> Self {
        Self {
            stream,
            keyframe: false,
            seq,
            body: PayloadBody::Grouped {
                pts,
                delta: 0,
                objects,
            },
        }
    }

    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }

    fn encoded_len(&self, multiple: bool) -> usize {
        let len_field = if multiple { 2 } else { 0 };
        match &self.body {
            PayloadBody::Fragment { data, .. } => FRAGMENT_PAYLOAD_HEADER + len_field + data.len(),
            PayloadBody::Grouped { objects, .. } => {
                8 + len_field + objects.iter().map(|o| 1 + o.len()).sum::<usize>()
            }
        }
    }

    fn put(&self, buf: &mut BytesMut, multiple: bool) {
        buf.put_u8(self.stream & 0x7F | if self.keyframe { 0x80 } else { 0 });
        buf.put_u8(self.seq);
        match &self.body {
            PayloadBody::Fragment {
                object_size,
                offset,
                pts,
                data,
            } => {
                buf.put_u32_le(*offset);
                buf.put_u8(8);
                buf.put_u32_le(*object_size);
                buf.put_u32_le(*pts);
                if multiple {
                    buf.put_u16_le(data.len() as u16);
                }
                buf.put_slice(data);
            }
            PayloadBody::Grouped { pts, delta, objects } => {
                buf.put_u32_le(*pts);
                buf.put_u8(1);
                buf.put_u8(*delta);
                let total: usize = objects.iter().map(|o| 1 + o.len()).sum();
                if multiple {
                    buf.put_u16_le(total as u16);
                }
                for object in objects {
                    buf.put_u8(object.len() as u8);
                    buf.put_slice(object);
                }
            }
        }
    }
}

/// Builder for one fixed-size data packet.
///
/// Layout: two bytes of error correction data, relative data size with a
/// 16-bit padding length, u8 media object numbers, u32 offsets and u8
/// replicated data lengths.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    packet_size: u32,
    send_time: u32,
    duration: u16,
    payloads: Vec<Payload>,
    force_multiple: bool,
}

impl PacketWriter {
    pub fn new(packet_size: u32) -> Self {
        Self {
            packet_size,
            send_time: 0,
            duration: 0,
            payloads: Vec::new(),
            force_multiple: false,
        }
    }

    pub fn send_time(mut self, ms: u32) -> Self {
        self.send_time = ms;
        self
    }

    pub fn duration(mut self, ms: u16) -> Self {
        self.duration = ms;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payloads.push(payload);
        self
    }

    /// Use multiple-payload framing even for a single payload.
    pub fn multiple(mut self) -> Self {
        self.force_multiple = true;
        self
    }

    /// Largest fragment that fits in a single-payload packet of `packet_size` bytes.
    pub fn fragment_capacity(packet_size: u32) -> usize {
        (packet_size as usize).saturating_sub(PACKET_HEADER_SIZE + FRAGMENT_PAYLOAD_HEADER)
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let multiple = self.force_multiple || self.payloads.len() != 1;
        if self.payloads.len() > 0x3F {
            return Err(Error::unsupported(format!("{} payloads in one packet", self.payloads.len())));
        }

        let header_len = PACKET_HEADER_SIZE + usize::from(multiple);
        let used = header_len
            + self
                .payloads
                .iter()
                .map(|p| p.encoded_len(multiple))
                .sum::<usize>();
        let size = self.packet_size as usize;
        if used > size {
            return Err(Error::malformed(format!("packet needs {used} bytes, size is {size}")));
        }
        let padding = size - used;

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(0x82);
        buf.put_u16(0);
        buf.put_u8(0x10 | u8::from(multiple));
        buf.put_u8(0x5D);
        buf.put_u16_le(padding as u16);
        buf.put_u32_le(self.send_time);
        buf.put_u16_le(self.duration);
        if multiple {
            buf.put_u8(0x80 | self.payloads.len() as u8);
        }
        for payload in &self.payloads {
            payload.put(&mut buf, multiple);
        }
        buf.put_bytes(0, padding);
        Ok(buf.to_vec())
    }
}

/// One media object queued in an [`AsfFileBuilder`].
#[derive(Debug, Clone)]
struct QueuedFrame {
    stream: u8,
    keyframe: bool,
    pts: u32,
    data: Vec<u8>,
}

/// Builds a complete file: header, Data Object header and packets.
///
/// Every frame is split across single-payload packets in queue order.
/// Media object numbers advance by one per frame and stream. Frame
/// timestamps are in milliseconds; the file preroll is added on the wire.
#[derive(Debug, Clone)]
pub struct AsfFileBuilder {
    header: HeaderWriter,
    frames: Vec<QueuedFrame>,
}

impl AsfFileBuilder {
    pub fn new(header: HeaderWriter) -> Self {
        Self {
            header,
            frames: Vec::new(),
        }
    }

    pub fn frame(mut self, stream: u8, pts: u32, keyframe: bool, data: Vec<u8>) -> Self {
        self.frames.push(QueuedFrame {
            stream,
            keyframe,
            pts,
            data,
        });
        self
    }

    /// Encode every queued frame into packets.
    pub fn packets(&self) -> Result<Vec<Vec<u8>>> {
        let packet_size = self.header.file.packet_size;
        let capacity = PacketWriter::fragment_capacity(packet_size);
        if capacity == 0 {
            return Err(Error::malformed(format!("packet size {packet_size} too small")));
        }
        let preroll = self.header.file.preroll as u32;

        let mut seqs = [0u8; 128];
        let mut packets = Vec::new();
        for frame in &self.frames {
            let seq = &mut seqs[usize::from(frame.stream & 0x7F)];
            let wire_pts = frame.pts + preroll;
            let chunks: Vec<&[u8]> = if frame.data.is_empty() {
                vec![&frame.data[..]]
            } else {
                frame.data.chunks(capacity).collect()
            };
            let mut offset = 0u32;
            for chunk in chunks {
                let mut payload = Payload::fragment(
                    frame.stream,
                    *seq,
                    frame.data.len() as u32,
                    offset,
                    wire_pts,
                    chunk.to_vec(),
                );
                payload.keyframe = frame.keyframe;
                packets.push(
                    PacketWriter::new(packet_size)
                        .send_time(wire_pts)
                        .payload(payload)
                        .build()?,
                );
                offset += chunk.len() as u32;
            }
            *seq = seq.wrapping_add(1);
        }
        Ok(packets)
    }

    /// The complete file bytes. The packet count and file size fields are filled in.
    pub fn build(mut self) -> Result<Vec<u8>> {
        let packets = self.packets()?;
        let packet_size = self.header.file.packet_size;
        let file_id = self.header.file.file_id;

        self.header.file.data_packet_count = packets.len() as u64;
        let header_len = self.header.build().len();
        self.header.file.file_size =
            (header_len + DATA_OBJECT_HEADER_SIZE + packets.len() * packet_size as usize) as u64;

        let mut out = self.header.build();
        out.extend_from_slice(&data_object_header(file_id, packets.len() as u64, packet_size));
        for packet in packets {
            out.extend_from_slice(&packet);
        }
        Ok(out)
    }
}
