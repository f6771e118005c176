//! Top-level Header Object parsing.

use tracing::{debug, trace, warn};

use super::{content, extension, AsfContent, AsfFile, AsfHeader, AsfStream, StreamSlot, MAX_STREAMS};
use crate::cursor::BinaryCursor;
use crate::guid::{ObjectKind, StreamType};
use crate::{Error, Result};
use asfstream_common::Utf16Codec;

/// Size of the GUID + length prefix carried by every ASF object.
pub const HEADER_OBJECT_PREFIX: usize = 24;

/// Parses Header Object contents into an [`AsfHeader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderParser {
    codec: Utf16Codec,
}

/// Mutable state shared by the object sub-parsers.
pub(super) struct HeaderBuilder {
    pub(super) file: Option<AsfFile>,
    pub(super) content: Option<AsfContent>,
    pub(super) slots: Vec<StreamSlot>,
    pub(super) codec: Utf16Codec,
}

impl HeaderBuilder {
    pub(super) fn new(codec: Utf16Codec) -> Self {
        Self {
            file: None,
            content: None,
            slots: Vec::new(),
            codec,
        }
    }

    /// Compact index for a wire stream number, allocating a slot on first sight.
    ///
    /// Returns `None` once [`MAX_STREAMS`] distinct numbers have been seen.
    pub(super) fn stream_id(&mut self, number: u16) -> Option<usize> {
        if let Some(index) = self.slots.iter().position(|s| s.number == number) {
            return Some(index);
        }
        if self.slots.len() >= MAX_STREAMS {
            return None;
        }
        self.slots.push(StreamSlot {
            number,
            ..Default::default()
        });
        Some(self.slots.len() - 1)
    }
}

/// Split the next object off `cur`: returns its kind, the body offset and body length.
///
/// The body length is clamped to the bytes actually present. `Ok(None)` means
/// the object declared a length shorter than its own prefix.
pub(super) fn next_object(cur: &mut BinaryCursor<'_>) -> Result<Option<(ObjectKind, usize, usize)>> {
    if cur.remaining() < HEADER_OBJECT_PREFIX {
        return Err(Error::malformed(format!(
            "truncated object prefix: {} bytes left",
            cur.remaining()
        )));
    }
    let guid = cur.read_guid()?;
    let length = cur.read_u64()?;
    if length < HEADER_OBJECT_PREFIX as u64 {
        warn!(%guid, length, "object shorter than its prefix");
        return Ok(None);
    }
    let kind = guid.kind();
    if kind == ObjectKind::Error {
        debug!(%guid, "unknown object");
    }
    let declared = usize::try_from(length - HEADER_OBJECT_PREFIX as u64).unwrap_or(usize::MAX);
    Ok(Some((kind, cur.position(), declared.min(cur.remaining()))))
}

impl HeaderParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: Utf16Codec) -> Self {
        Self { codec }
    }

    /// Parse the bytes following the Header Object's 24-byte prefix.
    ///
    /// Broken or unknown sub-objects are skipped. The only hard failures are a
    /// truncated object prefix and a missing File Properties object. An object
    /// whose declared length is shorter than its prefix ends the object list.
    pub fn parse(&self, buffer: &[u8]) -> Result<AsfHeader> {
        if buffer.len() < 6 {
            return Err(Error::BufferUnderflow {
                need: 6,
                have: buffer.len(),
            });
        }

        let mut cur = BinaryCursor::new(buffer);
        let object_count = cur.read_u32()?;
        let _reserved = cur.read_u16()?;
        trace!(object_count, len = buffer.len(), "parsing header");

        let mut builder = HeaderBuilder::new(self.codec);

        while cur.remaining() > 0 {
            let Some((kind, start, len)) = next_object(&mut cur)? else {
                break;
            };
            let body = &buffer[start..start + len];

            let result = match kind {
                ObjectKind::FileProperties => parse_file_properties(&mut builder, body),
                ObjectKind::StreamProperties => parse_stream_properties(&mut builder, body),
                ObjectKind::StreamBitrateProperties => {
                    parse_stream_bitrates(&mut builder, body, start)
                }
                ObjectKind::HeaderExtension => extension::parse_header_extension(&mut builder, body),
                ObjectKind::ContentDescription => content::parse_content_description(&mut builder, body),
                ObjectKind::CodecList
                | ObjectKind::ScriptCommand
                | ObjectKind::Marker
                | ObjectKind::BitrateMutualExclusion
                | ObjectKind::ErrorCorrection
                | ObjectKind::ExtendedContentDescription
                | ObjectKind::ExtendedContentEncryption
                | ObjectKind::Padding
                | ObjectKind::Error => Ok(()),
                other => {
                    debug!(object = %other, "unexpected object in header");
                    Ok(())
                }
            };
            if let Err(err) = result {
                debug!(object = %kind, error = %err, "skipping header object");
            }

            cur.set_position(start + len);
        }

        let file = builder.file.ok_or(Error::MissingObject("file object"))?;
        let content = builder.content.unwrap_or_default();

        debug!(
            streams = builder.slots.iter().filter(|s| s.stream.is_some()).count(),
            packet_size = file.packet_size,
            packets = file.data_packet_count,
            "header parsed"
        );

        Ok(AsfHeader {
            file,
            content,
            slots: builder.slots,
        })
    }
}

fn parse_file_properties(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    if body.len() < 80 {
        return Err(Error::malformed("file properties object too short"));
    }
    let mut cur = BinaryCursor::new(body);

    let file_id = cur.read_guid()?;
    let file_size = cur.read_u64()?;
    cur.skip(8)?; // creation date
    let data_packet_count = cur.read_u64()?;
    let play_duration = cur.read_u64()?;
    let send_duration = cur.read_u64()?;
    let preroll = cur.read_u64()?;
    let flags = cur.read_u32()?;
    let packet_size = cur.read_u32()?;
    cur.skip(4)?; // maximum packet size, always equal to the minimum
    let max_bitrate = cur.read_u32()?;

    builder.file = Some(AsfFile {
        file_id,
        file_size,
        data_packet_count,
        play_duration,
        send_duration,
        preroll,
        packet_size,
        max_bitrate,
        broadcast: flags & 0x1 != 0,
        seekable: flags & 0x2 != 0,
    });
    Ok(())
}

/// Parse a Stream Properties body and register the stream.
pub(super) fn parse_stream_properties(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    if body.len() < 54 {
        return Err(Error::malformed("stream properties object too short"));
    }
    let mut cur = BinaryCursor::new(body);

    let stream_type = StreamType::from_kind(cur.read_guid()?.kind());
    let error_correction_type = cur.read_guid()?.kind();
    let time_offset = cur.read_u64()?;
    let private_len = cur.read_u32()? as usize;
    let ecc_len = cur.read_u32()? as usize;
    let flags = cur.read_u16()?;
    cur.skip(4)?; // reserved

    let private_data = cur.read_bytes(private_len)?.to_vec();
    let error_correction_data = cur.read_bytes(ecc_len)?.to_vec();

    let stream = AsfStream {
        stream_number: flags & 0x7F,
        stream_type,
        error_correction_type,
        time_offset,
        private_data,
        error_correction_data,
        encrypted: flags >> 15 != 0,
    };
    trace!(
        number = stream.stream_number,
        kind = %stream.stream_type,
        ecc = %stream.error_correction_type,
        encrypted = stream.encrypted,
        "stream properties"
    );

    match builder.stream_id(stream.stream_number) {
        Some(index) => builder.slots[index].stream = Some(stream),
        None => warn!(number = stream.stream_number, "stream table full, dropping stream"),
    }
    Ok(())
}

/// Parse Stream Bitrate Properties. `base` is the body offset in the parse buffer.
fn parse_stream_bitrates(builder: &mut HeaderBuilder, body: &[u8], base: usize) -> Result<()> {
    let mut cur = BinaryCursor::new(body);
    let count = cur.read_u16()? as usize;
    if body.len() < 2 + 6 * count {
        return Err(Error::BufferUnderflow {
            need: 2 + 6 * count,
            have: body.len(),
        });
    }

    for _ in 0..count {
        let number = cur.read_u16()? & 0x7F;
        let offset = base + cur.position();
        let bitrate = cur.read_u32()?;
        trace!(number, bitrate, "stream bitrate");

        if let Some(index) = builder.stream_id(number) {
            let slot = &mut builder.slots[index];
            slot.bitrate = bitrate;
            slot.bitrate_offset = Some(offset);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;
    use assert_matches::assert_matches;

    fn object(guid: Guid, body: &[u8]) -> Vec<u8> {
        let mut out = guid.to_bytes().to_vec();
        out.extend_from_slice(&((body.len() + 24) as u64).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn header(objects: &[Vec<u8>]) -> Vec<u8> {
        let mut out = (objects.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&[1, 2]);
        for obj in objects {
            out.extend_from_slice(obj);
        }
        out
    }

    fn file_properties(packet_size: u32, packets: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&Guid::new(1, 2, 3, [4; 8]).to_bytes());
        body.extend_from_slice(&123_456u64.to_le_bytes()); // file size
        body.extend_from_slice(&0u64.to_le_bytes()); // creation date
        body.extend_from_slice(&packets.to_le_bytes());
        body.extend_from_slice(&50_000_000u64.to_le_bytes()); // play
        body.extend_from_slice(&40_000_000u64.to_le_bytes()); // send
        body.extend_from_slice(&3_000u64.to_le_bytes()); // preroll
        body.extend_from_slice(&2u32.to_le_bytes()); // seekable
        body.extend_from_slice(&packet_size.to_le_bytes());
        body.extend_from_slice(&packet_size.to_le_bytes());
        body.extend_from_slice(&256_000u32.to_le_bytes());
        object(Guid::FILE_PROPERTIES, &body)
    }

    fn stream_properties(kind: Guid, number: u16, private: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&kind.to_bytes());
        body.extend_from_slice(&Guid::NO_ERROR_CORRECTION.to_bytes());
        body.extend_from_slice(&0u64.to_le_bytes());
        body.extend_from_slice(&(private.len() as u32).to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&number.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(private);
        object(Guid::STREAM_PROPERTIES, &body)
    }

    #[test]
    fn test_file_and_single_video_stream() {
        let buf = header(&[
            file_properties(3200, 10),
            stream_properties(Guid::VIDEO_MEDIA, 1, &[0; 4]),
        ]);
        let hdr = HeaderParser::new().parse(&buf).unwrap();

        assert_eq!(hdr.stream_count(), 1);
        assert_eq!(hdr.stream(0).unwrap().stream_number, 1);
        assert_eq!(hdr.stream(0).unwrap().stream_type, StreamType::Video);
        assert_eq!(hdr.file.packet_size, 3200);
        assert_eq!(hdr.file.data_packet_count, 10);
        assert!(hdr.file.seekable);
        assert!(!hdr.file.broadcast);
        assert!(hdr.content.is_empty());
    }

    #[test]
    fn test_missing_file_object_fails() {
        let buf = header(&[stream_properties(Guid::AUDIO_MEDIA, 2, &[])]);
        assert_matches!(
            HeaderParser::new().parse(&buf),
            Err(Error::MissingObject("file object"))
        );
    }

    #[test]
    fn test_short_buffer_fails() {
        assert_matches!(
            HeaderParser::new().parse(&[0, 0, 0]),
            Err(Error::BufferUnderflow { need: 6, have: 3 })
        );
    }

    #[test]
    fn test_truncated_object_prefix_fails() {
        let mut buf = header(&[file_properties(3200, 1)]);
        buf.extend_from_slice(&[0u8; 10]);
        assert_matches!(HeaderParser::new().parse(&buf), Err(Error::Malformed(_)));
    }

    #[test]
    fn test_short_stream_object_is_skipped() {
        let bad = object(Guid::STREAM_PROPERTIES, &[0u8; 20]);
        let buf = header(&[file_properties(3200, 1), bad]);
        let hdr = HeaderParser::new().parse(&buf).unwrap();
        assert_eq!(hdr.stream_count(), 0);
    }

    #[test]
    fn test_unknown_objects_are_skipped() {
        let unknown = object(Guid::new(0x1234_5678, 0, 0, [9; 8]), &[0xAB; 13]);
        let buf = header(&[unknown, file_properties(1000, 2)]);
        let hdr = HeaderParser::new().parse(&buf).unwrap();
        assert_eq!(hdr.file.packet_size, 1000);
    }

    #[test]
    fn test_bitrate_offsets_point_at_bitrate_bytes() {
        let mut body = 2u16.to_le_bytes().to_vec();
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&64_000u32.to_le_bytes());
        body.extend_from_slice(&0x8002u16.to_le_bytes());
        body.extend_from_slice(&128_000u32.to_le_bytes());
        let buf = header(&[
            file_properties(3200, 1),
            object(Guid::STREAM_BITRATE_PROPERTIES, &body),
        ]);

        let hdr = HeaderParser::new().parse(&buf).unwrap();
        assert_eq!(hdr.slots.len(), 2);
        assert_eq!(hdr.bitrate(0), 64_000);
        assert_eq!(hdr.bitrate(1), 128_000);
        assert_eq!(hdr.slots[1].number, 2);
        for slot in &hdr.slots {
            let off = slot.bitrate_offset.unwrap();
            let raw = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            assert_eq!(raw, slot.bitrate);
        }
        // bitrates alone do not make streams
        assert_eq!(hdr.stream_count(), 0);
    }

    #[test]
    fn test_bitrate_object_with_bad_count_is_skipped() {
        let mut body = 5u16.to_le_bytes().to_vec();
        body.extend_from_slice(&[0u8; 6]);
        let buf = header(&[
            file_properties(3200, 1),
            object(Guid::STREAM_BITRATE_PROPERTIES, &body),
        ]);
        let hdr = HeaderParser::new().parse(&buf).unwrap();
        assert!(hdr.slots.is_empty());
    }

    #[test]
    fn test_stream_table_capacity() {
        let mut objects = vec![file_properties(3200, 1)];
        for n in 1..=30u16 {
            objects.push(stream_properties(Guid::AUDIO_MEDIA, n, &[]));
        }
        let hdr = HeaderParser::new().parse(&header(&objects)).unwrap();
        assert_eq!(hdr.stream_count(), MAX_STREAMS);
        assert_eq!(hdr.index_of(23), Some(22));
        assert_eq!(hdr.index_of(24), None);
    }

    #[test]
    fn test_encrypted_flag_and_number_mask() {
        let buf = header(&[
            file_properties(3200, 1),
            stream_properties(Guid::AUDIO_MEDIA, 0x8000 | 0x85, &[]),
        ]);
        let hdr = HeaderParser::new().parse(&buf).unwrap();
        let stream = hdr.stream(0).unwrap();
        assert_eq!(stream.stream_number, 5);
        assert!(stream.encrypted);
    }

    #[test]
    fn test_overlong_declared_length_is_clamped() {
        let mut buf = header(&[file_properties(3200, 1)]);
        let mut padding = object(Guid::PADDING, &[0u8; 4]);
        padding[16..24].copy_from_slice(&1_000_000u64.to_le_bytes());
        buf.extend_from_slice(&padding);
        let hdr = HeaderParser::new().parse(&buf).unwrap();
        assert_eq!(hdr.file.packet_size, 3200);
    }
}
