//! Header Extension object and the Extended Stream Properties it carries.

use tracing::{debug, trace};

use super::metadata::parse_metadata;
use super::parser::{next_object, parse_stream_properties, HeaderBuilder, HEADER_OBJECT_PREFIX};
use super::StreamExtension;
use crate::cursor::BinaryCursor;
use crate::guid::ObjectKind;
use crate::{Error, Result};

pub(super) fn parse_header_extension(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    if body.len() < 22 {
        return Err(Error::malformed("header extension object too short"));
    }
    let mut cur = BinaryCursor::new(body);
    let _reserved_guid = cur.read_guid()?;
    let _reserved = cur.read_u16()?;
    let data_len = cur.read_u32()?;
    trace!(data_len, "header extension");

    while cur.remaining() > 0 {
        let Some((kind, start, len)) = next_object(&mut cur)? else {
            break;
        };
        let inner = &body[start..start + len];

        let result = match kind {
            ObjectKind::ExtendedStreamProperties => parse_extended_stream_properties(builder, inner),
            ObjectKind::Metadata => parse_metadata(builder, inner),
            ObjectKind::AdvancedMutualExclusion
            | ObjectKind::GroupMutualExclusion
            | ObjectKind::StreamPrioritization
            | ObjectKind::BandwidthSharing
            | ObjectKind::LanguageList
            | ObjectKind::MetadataLibrary
            | ObjectKind::IndexParameters
            | ObjectKind::MediaObjectIndexParameters
            | ObjectKind::TimecodeIndexParameters
            | ObjectKind::AdvancedContentEncryption
            | ObjectKind::Compatibility
            | ObjectKind::Padding
            | ObjectKind::Error => Ok(()),
            other => {
                debug!(object = %other, "unexpected object in header extension");
                Ok(())
            }
        };
        if let Err(err) = result {
            debug!(object = %kind, error = %err, "skipping extension object");
        }

        cur.set_position(start + len);
    }
    Ok(())
}

fn parse_extended_stream_properties(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    if body.len() < 64 {
        return Err(Error::malformed("extended stream properties object too short"));
    }
    let mut cur = BinaryCursor::new(body);

    let mut ext = StreamExtension {
        start_time: cur.read_u64()?,
        end_time: cur.read_u64()?,
        data_bitrate: cur.read_u32()?,
        buffer_size: cur.read_u32()?,
        initial_buffer_fullness: cur.read_u32()?,
        alternate_data_bitrate: cur.read_u32()?,
        alternate_buffer_size: cur.read_u32()?,
        alternate_initial_buffer_fullness: cur.read_u32()?,
        max_object_size: cur.read_u32()?,
        ..Default::default()
    };

    let flags = cur.read_u32()?;
    ext.reliable = flags & 0x1 != 0;
    ext.seekable = flags & 0x2 != 0;
    ext.no_cleanpoints = flags & 0x4 != 0;
    ext.resend_live_cleanpoints = flags & 0x8 != 0;

    let stream_number = cur.read_u16()?;
    ext.language_id = cur.read_u16()?;
    ext.average_time_per_frame = cur.read_u64()?;
    let name_count = cur.read_u16()?;
    ext.payload_extension_count = cur.read_u16()?;

    for _ in 0..name_count {
        let _language_index = cur.read_u16()?;
        let len = cur.read_u16()? as usize;
        ext.stream_names.push(builder.codec.decode(cur.read_bytes(len)?));
    }

    for _ in 0..ext.payload_extension_count {
        let _system = cur.read_guid()?;
        let _data_size = cur.read_u16()?;
        let info_len = cur.read_u32()? as usize;
        cur.skip(info_len)?;
    }

    trace!(
        stream_number,
        data_bitrate = ext.data_bitrate,
        names = ext.stream_names.len(),
        "extended stream properties"
    );

    if let Some(index) = builder.stream_id(stream_number) {
        builder.slots[index].extension = Some(ext);
    }

    // A Stream Properties object may be embedded in the trailing bytes.
    if cur.remaining() >= HEADER_OBJECT_PREFIX {
        let kind = cur.read_guid()?.kind();
        let length = cur.read_u64()?;
        if length.checked_sub(HEADER_OBJECT_PREFIX as u64) == Some(cur.remaining() as u64) {
            if kind == ObjectKind::StreamProperties {
                let rest = cur.read_bytes(cur.remaining())?;
                parse_stream_properties(builder, rest)?;
            } else {
                debug!(object = %kind, "unexpected object embedded in stream extension");
            }
        } else {
            debug!(length, remaining = cur.remaining(), "invalid embedded object length");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::guid::{Guid, StreamType};
    use crate::header::{AsfFile, AsfHeader, StreamExtension};
    use crate::writer::{HeaderWriter, StreamSpec};

    /// Header whose only audio stream is described inside its extension.
    fn embedded_header() -> Vec<u8> {
        HeaderWriter::new(AsfFile {
            packet_size: 1_024,
            ..Default::default()
        })
        .stream(
            StreamSpec::new(3, StreamType::Audio)
                .private_data(vec![1, 2, 3, 4])
                .extension(StreamExtension {
                    data_bitrate: 64_000,
                    ..Default::default()
                })
                .embedded(true),
        )
        .build_body()
    }

    fn embedded_offset(body: &[u8]) -> usize {
        let guid = Guid::STREAM_PROPERTIES.to_bytes();
        body.windows(16).position(|w| w == guid).unwrap()
    }

    #[test]
    fn test_embedded_stream_properties_define_stream() {
        let header = AsfHeader::parse(&embedded_header()).unwrap();

        assert_eq!(header.stream_count(), 1);
        let index = header.index_of(3).unwrap();
        let stream = header.stream(index).unwrap();
        assert_eq!(stream.stream_type, StreamType::Audio);
        assert_eq!(stream.private_data, vec![1, 2, 3, 4]);
        assert_eq!(
            header.slots[index].extension.as_ref().map(|e| e.data_bitrate),
            Some(64_000)
        );
    }

    #[test]
    fn test_embedded_object_with_wrong_length_is_ignored() {
        let mut body = embedded_header();
        let at = embedded_offset(&body) + 16;
        let len = u64::from_le_bytes(body[at..at + 8].try_into().unwrap());
        body[at..at + 8].copy_from_slice(&(len + 1).to_le_bytes());

        let header = AsfHeader::parse(&body).unwrap();
        assert_eq!(header.stream_count(), 0);
        let index = header.index_of(3).unwrap();
        assert!(header.slots[index].extension.is_some());
    }

    #[test]
    fn test_embedded_object_of_other_kind_is_ignored() {
        let mut body = embedded_header();
        let at = embedded_offset(&body);
        body[at..at + 16].copy_from_slice(&Guid::PADDING.to_bytes());

        let header = AsfHeader::parse(&body).unwrap();
        assert_eq!(header.stream_count(), 0);
        assert!(header.slots[0].extension.is_some());
    }
}
