//! Codec private data carried in Stream Properties.
//!
//! Audio streams carry a WAVEFORMATEX. Video streams carry an 11-byte prefix
//! (encoded width, encoded height, one reserved byte, format data size)
//! followed by a BITMAPINFOHEADER. Audio streams using the audio-spread error
//! correction also describe an interleave grid that the demuxer must undo.

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::cursor::BinaryCursor;
use crate::{Error, Result};

/// Length of the video private-data prefix before the BITMAPINFOHEADER.
pub const VIDEO_INFO_PREFIX: usize = 11;

/// Fixed part of a BITMAPINFOHEADER.
pub const BITMAP_INFO_HEADER_SIZE: usize = 40;

/// Four-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FourCc(pub [u8; 4]);

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// WAVEFORMATEX audio description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Codec-specific bytes following `cbSize`.
    pub extra: Vec<u8>,
}

impl WaveFormatEx {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cur = BinaryCursor::new(data);
        let mut wf = Self {
            format_tag: cur.read_u16()?,
            channels: cur.read_u16()?,
            samples_per_sec: cur.read_u32()?,
            avg_bytes_per_sec: cur.read_u32()?,
            block_align: cur.read_u16()?,
            bits_per_sample: cur.read_u16()?,
            extra: Vec::new(),
        };
        if cur.remaining() >= 2 {
            let cb_size = cur.read_u16()? as usize;
            let available = cb_size.min(cur.remaining());
            wf.extra = cur.read_bytes(available)?.to_vec();
        }
        Ok(wf)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(18 + self.extra.len());
        buf.put_u16_le(self.format_tag);
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.samples_per_sec);
        buf.put_u32_le(self.avg_bytes_per_sec);
        buf.put_u16_le(self.block_align);
        buf.put_u16_le(self.bits_per_sample);
        buf.put_u16_le(self.extra.len() as u16);
        buf.put_slice(&self.extra);
        buf.to_vec()
    }
}

/// BITMAPINFOHEADER video description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitmapInfoHeader {
    pub size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: FourCc,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl BitmapInfoHeader {
    pub fn new(width: i32, height: i32, compression: [u8; 4]) -> Self {
        Self {
            size: BITMAP_INFO_HEADER_SIZE as u32,
            width,
            height,
            planes: 1,
            bit_count: 24,
            compression: FourCc(compression),
            ..Default::default()
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BITMAP_INFO_HEADER_SIZE {
            return Err(Error::BufferUnderflow {
                need: BITMAP_INFO_HEADER_SIZE,
                have: data.len(),
            });
        }
        let mut cur = BinaryCursor::new(data);
        Ok(Self {
            size: cur.read_u32()?,
            width: cur.read_u32()? as i32,
            height: cur.read_u32()? as i32,
            planes: cur.read_u16()?,
            bit_count: cur.read_u16()?,
            compression: FourCc(cur.read_bytes(4)?.try_into().map_err(|_| {
                Error::malformed("fourcc")
            })?),
            size_image: cur.read_u32()?,
            x_pels_per_meter: cur.read_u32()? as i32,
            y_pels_per_meter: cur.read_u32()? as i32,
            clr_used: cur.read_u32()?,
            clr_important: cur.read_u32()?,
        })
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.size);
        buf.put_i32_le(self.width);
        buf.put_i32_le(self.height);
        buf.put_u16_le(self.planes);
        buf.put_u16_le(self.bit_count);
        buf.put_slice(&self.compression.0);
        buf.put_u32_le(self.size_image);
        buf.put_i32_le(self.x_pels_per_meter);
        buf.put_i32_le(self.y_pels_per_meter);
        buf.put_u32_le(self.clr_used);
        buf.put_u32_le(self.clr_important);
    }
}

/// Decoded video stream private data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub bitmap: BitmapInfoHeader,
    /// Everything from the BITMAPINFOHEADER on, handed to decoders verbatim.
    pub decoder_config: Vec<u8>,
}

impl VideoInfo {
    pub fn parse(private_data: &[u8]) -> Result<Self> {
        let mut cur = BinaryCursor::new(private_data);
        let width = cur.read_u32()?;
        let height = cur.read_u32()?;
        cur.skip(1)?;
        let _format_size = cur.read_u16()?;
        let decoder_config = &private_data[VIDEO_INFO_PREFIX..];
        let bitmap = BitmapInfoHeader::parse(decoder_config)?;
        Ok(Self {
            width,
            height,
            bitmap,
            decoder_config: decoder_config.to_vec(),
        })
    }

    /// Encode private data for a video Stream Properties object.
    pub fn encode(width: u32, height: u32, bitmap: &BitmapInfoHeader, extra: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(VIDEO_INFO_PREFIX + BITMAP_INFO_HEADER_SIZE + extra.len());
        buf.put_u32_le(width);
        buf.put_u32_le(height);
        buf.put_u8(2);
        buf.put_u16_le((BITMAP_INFO_HEADER_SIZE + extra.len()) as u16);
        bitmap.put(&mut buf);
        buf.put_slice(extra);
        buf.to_vec()
    }
}

/// Audio interleave grid: `height` rows of `width` blocks of `block` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderParams {
    pub height: usize,
    pub width: usize,
    pub block: usize,
}

impl Default for ReorderParams {
    fn default() -> Self {
        Self {
            height: 1,
            width: 1,
            block: 1,
        }
    }
}

impl ReorderParams {
    /// Read the grid from audio-spread error correction data.
    ///
    /// Byte 0 is the span, bytes 1..3 the virtual packet length and bytes
    /// 3..5 the virtual chunk length. Short or degenerate data yields the
    /// identity grid.
    pub fn from_spread_data(ecc: &[u8]) -> Self {
        if ecc.len() < 5 {
            return Self::default();
        }
        let height = ecc[0] as usize;
        let packet_len = u16::from_le_bytes([ecc[1], ecc[2]]) as usize;
        let block = u16::from_le_bytes([ecc[3], ecc[4]]) as usize;
        if block == 0 {
            return Self::default();
        }
        Self {
            height,
            width: packet_len / block,
            block,
        }
    }

    /// Encode as audio-spread error correction data.
    pub fn to_spread_data(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u8(self.height as u8);
        buf.put_u16_le((self.width * self.block) as u16);
        buf.put_u16_le(self.block as u16);
        buf.put_u16_le(1); // silence data length
        buf.put_u8(0);
        buf.to_vec()
    }

    /// Whether frames must be reassembled and de-interleaved.
    pub fn is_interleaved(&self) -> bool {
        self.height > 1 && self.width > 1
    }
}
