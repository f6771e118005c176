//! MMSH chunk framing.
//!
//! A chunk is a 4-byte header (type, length; both little-endian u16), a
//! type-specific extended header, then `length - extended header` payload
//! bytes.

use bytes::{Buf, BufMut, BytesMut};

use asfstream_common::{Error, Result};

pub const CHUNK_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// `$D`: one data packet.
    Data,
    /// `$E`: end of stream; a nonzero continue flag means a new stream follows.
    End,
    /// `$H`: part of the ASF header.
    AsfHeader,
    /// `$C`: a replacement header follows.
    Reset,
    Other(u16),
}

impl ChunkType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x4424 => Self::Data,
            0x4524 => Self::End,
            0x4824 => Self::AsfHeader,
            0x4324 => Self::Reset,
            other => Self::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::Data => 0x4424,
            Self::End => 0x4524,
            Self::AsfHeader => 0x4824,
            Self::Reset => 0x4324,
            Self::Other(value) => value,
        }
    }

    /// Length of the extended header following the chunk header.
    pub fn ext_len(self) -> usize {
        match self {
            Self::Data | Self::AsfHeader => 8,
            Self::End | Self::Reset => 4,
            Self::Other(_) => 0,
        }
    }
}

/// A decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: ChunkType,
    /// Payload bytes after the extended header.
    pub length: usize,
    /// Sequence number of a data chunk, continue flag of an end chunk.
    pub value: u32,
}

impl ChunkHeader {
    /// Decode from the 4-byte header and its extended header.
    pub fn parse(header: [u8; CHUNK_HEADER_LEN], ext: &[u8]) -> Result<Self> {
        let mut cur = &header[..];
        let chunk_type = ChunkType::from_u16(cur.get_u16_le());
        let declared = usize::from(cur.get_u16_le());
        if ext.len() != chunk_type.ext_len() {
            return Err(Error::protocol(format!("extended header of {} bytes", ext.len())));
        }
        let length = declared.checked_sub(ext.len()).ok_or_else(|| {
            Error::protocol(format!("chunk length {declared} shorter than its extended header"))
        })?;
        let value = match chunk_type {
            ChunkType::Data | ChunkType::End => (&ext[..4]).get_u32_le(),
            _ => 0,
        };
        Ok(Self {
            chunk_type,
            length,
            value,
        })
    }

    pub fn continues(&self) -> bool {
        self.value != 0
    }
}

/// Frame a chunk the way a server sends it. `value` fills the first word
/// of the extended header.
pub fn encode_chunk(chunk_type: ChunkType, value: u32, payload: &[u8]) -> Vec<u8> {
    let ext_len = chunk_type.ext_len();
    let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + ext_len + payload.len());
    buf.put_u16_le(chunk_type.to_u16());
    buf.put_u16_le((ext_len + payload.len()) as u16);
    if ext_len >= 4 {
        buf.put_u32_le(value);
        buf.put_bytes(0, ext_len - 4);
    }
    buf.put_slice(payload);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(raw: &[u8]) -> ChunkHeader {
        let header: [u8; 4] = raw[..4].try_into().unwrap();
        let kind = ChunkType::from_u16(u16::from_le_bytes([raw[0], raw[1]]));
        ChunkHeader::parse(header, &raw[4..4 + kind.ext_len()]).unwrap()
    }

    #[test]
    fn test_type_codes_are_dollar_letters() {
        assert_eq!(&ChunkType::Data.to_u16().to_le_bytes(), b"$D");
        assert_eq!(&ChunkType::End.to_u16().to_le_bytes(), b"$E");
        assert_eq!(&ChunkType::AsfHeader.to_u16().to_le_bytes(), b"$H");
        assert_eq!(&ChunkType::Reset.to_u16().to_le_bytes(), b"$C");
        assert_eq!(ChunkType::from_u16(0x4d24), ChunkType::Other(0x4d24));
    }

    #[test]
    fn test_data_chunk() {
        let raw = encode_chunk(ChunkType::Data, 42, &[7u8; 100]);
        assert_eq!(raw.len(), 4 + 8 + 100);
        let header = split(&raw);
        assert_eq!(header.chunk_type, ChunkType::Data);
        assert_eq!(header.length, 100);
        assert_eq!(header.value, 42);
    }

    #[test]
    fn test_end_chunk_continue_flag() {
        let stop = split(&encode_chunk(ChunkType::End, 0, &[]));
        assert_eq!(stop.chunk_type, ChunkType::End);
        assert_eq!(stop.length, 0);
        assert!(!stop.continues());
        assert!(split(&encode_chunk(ChunkType::End, 1, &[])).continues());
    }

    #[test]
    fn test_length_shorter_than_extension() {
        let header = [0x24, 0x44, 0x04, 0x00];
        assert!(matches!(
            ChunkHeader::parse(header, &[0u8; 8]),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_unknown_chunk_has_no_extension() {
        let header = [0x24, 0x4d, 0x10, 0x00];
        let parsed = ChunkHeader::parse(header, &[]).unwrap();
        assert_eq!(parsed.chunk_type, ChunkType::Other(0x4d24));
        assert_eq!(parsed.length, 16);
    }
}
