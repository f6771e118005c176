//! MMS wire framing.
//!
//! Every message on an MMS connection starts with an 8-byte prefix. A prefix
//! whose second word is [`COMMAND_MAGIC`] opens a command frame:
//!
//! ```text
//! 0   u32  0x00000001
//! 4   u32  0xB00BFACE
//! 8   u32  len8 * 8 + 32
//! 12  u32  "MMS "
//! 16  u32  len8 + 4
//! 20  u32  sequence number
//! 24  u64  timestamp (zero)
//! 32  u32  len8 + 2
//! 36  u32  direction << 16 | command
//! 40  u32  prefix 1
//! 44  u32  prefix 2
//! 48       body, zero padded to len8 * 8 bytes
//! ```
//!
//! Otherwise the prefix heads a media packet: sequence number, packet type,
//! flags and the packet length including the prefix.

use bytes::{Buf, BufMut, BytesMut};

use asfstream_common::{Error, Result};

pub const COMMAND_MAGIC: u32 = 0xB00B_FACE;
/// `"MMS "` read as a little-endian word.
pub const PROTOCOL_TAG: u32 = 0x2053_4D4D;
/// Fixed part of a command frame, prefixes included.
pub const COMMAND_HEADER_LEN: usize = 48;
/// Largest command frame a client accepts.
pub const MAX_COMMAND_LEN: usize = 102_400;

/// Direction of a command sent by the client.
pub const TO_SERVER: u16 = 0x0003;
/// Direction of a command sent by the server.
pub const TO_CLIENT: u16 = 0x0004;

/// Media packet type of header packets.
pub const HEADER_PACKET_TYPE: u8 = 0x02;
/// Media packet type of data packets, also sent in the start-play command.
pub const DATA_PACKET_TYPE: u8 = 0x04;

/// Command identifiers.
pub mod id {
    pub const CONNECT_INFO: u16 = 0x01;
    pub const TRANSPORT: u16 = 0x02;
    pub const TRANSPORT_FAILED: u16 = 0x03;
    pub const REQUEST_FILE: u16 = 0x05;
    pub const FILE_INFO: u16 = 0x06;
    pub const START_PLAY: u16 = 0x07;
    pub const HEADER_INFO: u16 = 0x11;
    pub const REQUEST_HEADER: u16 = 0x15;
    pub const AUTH_REQUIRED: u16 = 0x1A;
    pub const KEEPALIVE: u16 = 0x1B;
    pub const END_OF_STREAM: u16 = 0x1E;
    pub const NEW_STREAM: u16 = 0x20;
    pub const STREAM_SELECTED: u16 = 0x21;
    pub const SELECT_STREAMS: u16 = 0x33;
}

/// A decoded command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command: u16,
    pub direction: u16,
    pub seq: u32,
    pub prefix1: u32,
    pub prefix2: u32,
    /// Body including its padding.
    pub body: Vec<u8>,
}

impl Command {
    pub fn new(command: u16, prefix1: u32, prefix2: u32, body: Vec<u8>) -> Self {
        Self {
            command,
            direction: TO_SERVER,
            seq: 0,
            prefix1,
            prefix2,
            body,
        }
    }

    pub fn direction(mut self, direction: u16) -> Self {
        self.direction = direction;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let len8 = self.body.len().div_ceil(8);
        let mut buf = BytesMut::with_capacity(COMMAND_HEADER_LEN + len8 * 8);
        buf.put_u32_le(0x0000_0001);
        buf.put_u32_le(COMMAND_MAGIC);
        buf.put_u32_le((len8 * 8 + 32) as u32);
        buf.put_u32_le(PROTOCOL_TAG);
        buf.put_u32_le((len8 + 4) as u32);
        buf.put_u32_le(self.seq);
        buf.put_u64_le(0);
        buf.put_u32_le((len8 + 2) as u32);
        buf.put_u32_le(u32::from(self.direction) << 16 | u32::from(self.command));
        buf.put_u32_le(self.prefix1);
        buf.put_u32_le(self.prefix2);
        buf.put_slice(&self.body);
        buf.put_bytes(0, len8 * 8 - self.body.len());
        buf.to_vec()
    }

    /// Decode a complete frame as produced by [`Command::encode`].
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < COMMAND_HEADER_LEN {
            return Err(Error::protocol(format!("command frame of {} bytes", frame.len())));
        }
        let mut cur = frame;
        cur.advance(4);
        if cur.get_u32_le() != COMMAND_MAGIC {
            return Err(Error::protocol("bad command magic"));
        }
        cur.advance(4);
        if cur.get_u32_le() != PROTOCOL_TAG {
            return Err(Error::protocol("missing MMS protocol tag"));
        }
        cur.advance(4);
        let seq = cur.get_u32_le();
        cur.advance(12);
        let word = cur.get_u32_le();
        let prefix1 = cur.get_u32_le();
        let prefix2 = cur.get_u32_le();

        Ok(Self {
            command: (word & 0xFFFF) as u16,
            direction: (word >> 16) as u16,
            seq,
            prefix1,
            prefix2,
            body: cur.to_vec(),
        })
    }
}

/// What an 8-byte packet prefix announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPrefix {
    /// A command frame; see [`command_remaining`] for its length.
    Command { flags: u8 },
    /// A header or data packet of `len` payload bytes.
    Media { seq: u32, packet_type: u8, flags: u8, len: usize },
}

impl PacketPrefix {
    pub fn parse(raw: &[u8; 8]) -> Result<Self> {
        let mut cur = &raw[..];
        let seq = cur.get_u32_le();
        if u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) == COMMAND_MAGIC {
            return Ok(Self::Command { flags: raw[3] });
        }
        let packet_type = cur.get_u8();
        let flags = cur.get_u8();
        let total = usize::from(cur.get_u16_le());
        let len = total
            .checked_sub(8)
            .ok_or_else(|| Error::protocol(format!("media packet length {total}")))?;
        Ok(Self::Media {
            seq,
            packet_type,
            flags,
            len,
        })
    }
}

/// Number of frame bytes still to read after the prefix and the 4-byte
/// length word that follows it.
pub fn command_remaining(length_word: [u8; 4]) -> Result<usize> {
    let len = u32::from_le_bytes(length_word) as usize + 4;
    if len > MAX_COMMAND_LEN - 12 {
        return Err(Error::protocol(format!("command frame of {len} bytes")));
    }
    Ok(len)
}

/// Frame a media packet the way a server sends it.
pub fn encode_media_packet(seq: u32, packet_type: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u32_le(seq);
    buf.put_u8(packet_type);
    buf.put_u8(flags);
    buf.put_u16_le((payload.len() + 8) as u16);
    buf.put_slice(payload);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Command::new(id::REQUEST_HEADER, 1, 0, vec![0xAA; 40]).seq(7).encode();
        assert_eq!(frame.len(), 88);
        assert_eq!(&frame[0..4], &[1, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[0xCE, 0xFA, 0x0B, 0xB0]);
        assert_eq!(u32::from_le_bytes(frame[8..12].try_into().unwrap()), 72);
        assert_eq!(&frame[12..16], b"MMS ");
        assert_eq!(u32::from_le_bytes(frame[16..20].try_into().unwrap()), 9);
        assert_eq!(u32::from_le_bytes(frame[20..24].try_into().unwrap()), 7);
        assert_eq!(u32::from_le_bytes(frame[32..36].try_into().unwrap()), 7);
        assert_eq!(u32::from_le_bytes(frame[36..40].try_into().unwrap()), 0x0003_0015);
        assert_eq!(u32::from_le_bytes(frame[40..44].try_into().unwrap()), 1);
    }

    #[test]
    fn test_body_padding() {
        let frame = Command::new(id::KEEPALIVE, 0, 0, vec![1, 2, 3]).encode();
        assert_eq!(frame.len(), COMMAND_HEADER_LEN + 8);
        assert_eq!(&frame[48..], &[1, 2, 3, 0, 0, 0, 0, 0]);

        let empty = Command::new(id::KEEPALIVE, 0, 0, Vec::new()).encode();
        assert_eq!(empty.len(), COMMAND_HEADER_LEN);
    }

    #[test]
    fn test_decode_server_frame() {
        let frame = Command::new(id::FILE_INFO, 0, 0x10, vec![9; 16]).direction(TO_CLIENT).seq(3).encode();
        let prefix: [u8; 8] = frame[..8].try_into().unwrap();
        assert_eq!(PacketPrefix::parse(&prefix).unwrap(), PacketPrefix::Command { flags: 0 });
        assert_eq!(command_remaining(frame[8..12].try_into().unwrap()).unwrap(), frame.len() - 12);

        let cmd = Command::decode(&frame).unwrap();
        assert_eq!(cmd.command, id::FILE_INFO);
        assert_eq!(cmd.direction, TO_CLIENT);
        assert_eq!(cmd.seq, 3);
        assert_eq!(cmd.prefix2, 0x10);
        assert_eq!(cmd.body, vec![9; 16]);
    }

    #[test]
    fn test_decode_rejects_bad_tag() {
        let mut frame = Command::new(id::FILE_INFO, 0, 0, Vec::new()).encode();
        frame[12] = b'X';
        assert!(matches!(Command::decode(&frame), Err(Error::ProtocolViolation(_))));
        assert!(Command::decode(&frame[..20]).is_err());
    }

    #[test]
    fn test_media_prefix() {
        let packet = encode_media_packet(5, HEADER_PACKET_TYPE, 0x0C, &[0u8; 100]);
        let prefix: [u8; 8] = packet[..8].try_into().unwrap();
        assert_eq!(
            PacketPrefix::parse(&prefix).unwrap(),
            PacketPrefix::Media {
                seq: 5,
                packet_type: HEADER_PACKET_TYPE,
                flags: 0x0C,
                len: 100
            }
        );
        assert!(PacketPrefix::parse(&[0, 0, 0, 0, 4, 0, 3, 0]).is_err());
    }

    #[test]
    fn test_oversized_command_rejected() {
        assert!(command_remaining(200_000u32.to_le_bytes()).is_err());
    }
}
