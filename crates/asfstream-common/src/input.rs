//! The byte-source contract shared by files and network sessions.
//!
//! The demuxer pulls bytes from an [`InputSource`] without knowing whether
//! they come from a local file or a streaming server.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// A positioned source of ASF bytes.
pub trait InputSource {
    /// Read up to `buf.len()` bytes. Returns 0 at end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move to an absolute byte position and return the resulting position.
    ///
    /// Sources that can only move forward return their current position when
    /// asked to go backwards.
    fn seek(&mut self, pos: u64) -> Result<u64>;

    /// Current byte position.
    fn position(&self) -> u64;

    /// Total length in bytes, or 0 when unknown.
    fn length(&self) -> u64;

    /// Whether arbitrary backward seeks are possible.
    fn is_seekable(&self) -> bool;

    /// Whether [`InputSource::seek_time`] is implemented.
    fn supports_seek_time(&self) -> bool {
        false
    }

    /// Ask the source to start delivering from a time offset in milliseconds.
    fn seek_time(&mut self, _time_ms: u64) -> Result<u64> {
        Err(Error::unsupported("time based seeking"))
    }

    /// Copy the leading bytes of the stream without consuming them.
    fn preview(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    /// Read until `buf` is full or the source is exhausted.
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        (**self).seek(pos)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn supports_seek_time(&self) -> bool {
        (**self).supports_seek_time()
    }

    fn seek_time(&mut self, time_ms: u64) -> Result<u64> {
        (**self).seek_time(time_ms)
    }

    fn preview(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).preview(buf)
    }
}

/// An [`InputSource`] over any seekable reader: files, cursors, buffers.
#[derive(Debug)]
pub struct FileInput<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl FileInput<BufReader<File>> {
    /// Open a file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> FileInput<R> {
    /// Wrap a reader, measuring its length.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, pos: 0, len })
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> InputSource for FileInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(self.pos)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> u64 {
        self.len
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn preview(&mut self, buf: &mut [u8]) -> Result<usize> {
        let saved = self.pos;
        self.seek(0)?;
        let n = self.read_fully(buf);
        self.seek(saved)?;
        n
    }
}
