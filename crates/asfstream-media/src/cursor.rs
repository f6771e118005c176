//! Bounds-checked little-endian reader over a byte slice.

use crate::guid::Guid;
use crate::{Error, Result};

/// A read position over a borrowed byte slice.
///
/// Every read checks the remaining length first and fails with
/// [`Error::BufferUnderflow`] instead of panicking.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute offset, clamped to the slice end.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.remaining() < len {
            Err(Error::BufferUnderflow {
                need: len,
                have: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.need(len)?;
        self.pos += len;
        Ok(())
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.need(len)?;
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        Ok(Guid::from_bytes(self.read_array()?))
    }

    /// Read a field whose width comes from a 2-bit selector: 0, 1, 2 or 4 bytes.
    ///
    /// Selector 0 reads nothing and yields `default`.
    pub fn read_var(&mut self, selector: u8, default: u32) -> Result<u32> {
        match selector & 0x03 {
            1 => self.read_u8().map(u32::from),
            2 => self.read_u16().map(u32::from),
            3 => self.read_u32(),
            _ => Ok(default),
        }
    }
}

/// Byte width of a 2-bit length-type selector.
pub fn var_width(selector: u8) -> usize {
    match selector & 0x03 {
        1 => 1,
        2 => 2,
        3 => 4,
        _ => 0,
    }
}
