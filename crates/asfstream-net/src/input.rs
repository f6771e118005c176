//! Streaming sessions as an [`InputSource`].

use tracing::{debug, info};

use asfstream_common::{InputSource, Protocol, Result};

use crate::location::{MmsUrl, Scheme};
use crate::mms::MmsClient;
use crate::mmsh::MmshClient;
use crate::{MediaSession, SessionConfig};

/// Step used to discard bytes on forward seeks.
const SKIP_CHUNK: usize = 1024;

/// A network session read like a forward-only file.
pub struct MmsInput {
    session: Box<dyn MediaSession>,
    protocol: Protocol,
}

impl MmsInput {
    /// Connect to an `mms://`, `mmst://` or `mmsh://` location.
    ///
    /// `mms://` uses the configured protocol; `auto` tries TCP first and
    /// falls back to HTTP.
    pub fn open(location: &str, config: &SessionConfig) -> Result<Self> {
        let url = MmsUrl::parse(location)?;
        let protocol = match url.scheme {
            Scheme::Mmst => Protocol::Tcp,
            Scheme::Mmsh => Protocol::Http,
            Scheme::Mms => config.protocol,
        };

        let (session, protocol): (Box<dyn MediaSession>, Protocol) = match protocol {
            Protocol::Tcp => (Box::new(MmsClient::connect(&url, config)?), Protocol::Tcp),
            Protocol::Http => (Box::new(MmshClient::connect(&url, config)?), Protocol::Http),
            Protocol::Auto => match MmsClient::connect(&url, config) {
                Ok(client) => (Box::new(client), Protocol::Tcp),
                Err(err) => {
                    info!(%url, error = %err, "mms over tcp failed, trying http");
                    (Box::new(MmshClient::connect(&url, config)?), Protocol::Http)
                }
            },
        };
        Ok(Self::from_session(session, protocol))
    }

    /// Wrap an already negotiated session.
    pub fn from_session(session: Box<dyn MediaSession>, protocol: Protocol) -> Self {
        Self { session, protocol }
    }

    /// Transport the session runs on.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

impl InputSource for MmsInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.session.read(buf)
    }

    /// Forward seeks read and discard; backward seeks stay put.
    fn seek(&mut self, pos: u64) -> Result<u64> {
        let mut current = self.session.position();
        if pos < current {
            debug!(pos, current, "backward seek ignored");
            return Ok(current);
        }
        let mut scratch = [0u8; SKIP_CHUNK];
        while current < pos {
            let want = (pos - current).min(SKIP_CHUNK as u64) as usize;
            let n = self.session.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
            current = self.session.position();
        }
        Ok(current)
    }

    fn position(&self) -> u64 {
        self.session.position()
    }

    fn length(&self) -> u64 {
        self.session.length()
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn supports_seek_time(&self) -> bool {
        true
    }

    fn seek_time(&mut self, time_ms: u64) -> Result<u64> {
        self.session.set_start_time(time_ms);
        Ok(self.session.position())
    }

    fn preview(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.session.peek_header(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a fixed byte string.
    struct Canned {
        data: Vec<u8>,
        pos: usize,
        start_time: Option<u64>,
    }

    impl Canned {
        fn new(len: usize) -> Self {
            Self {
                data: (0..len).map(|i| (i % 251) as u8).collect(),
                pos: 0,
                start_time: None,
            }
        }
    }

    impl MediaSession for Canned {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.data.len() - self.pos).min(700);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn peek_header(&self, buf: &mut [u8]) -> usize {
            let n = buf.len().min(16);
            buf[..n].copy_from_slice(&self.data[..n]);
            n
        }

        fn length(&self) -> u64 {
            self.data.len() as u64
        }

        fn position(&self) -> u64 {
            self.pos as u64
        }

        fn set_start_time(&mut self, time_ms: u64) {
            self.start_time = Some(time_ms);
        }

        fn close(&mut self) {
            self.pos = self.data.len();
        }
    }

    fn input(len: usize) -> MmsInput {
        MmsInput::from_session(Box::new(Canned::new(len)), Protocol::Tcp)
    }

    #[test]
    fn test_forward_seek_discards() {
        let mut input = input(10_000);
        assert_eq!(input.seek(4_321).unwrap(), 4_321);
        let mut byte = [0u8; 1];
        input.read(&mut byte).unwrap();
        assert_eq!(byte[0], (4_321 % 251) as u8);
    }

    #[test]
    fn test_backward_seek_stays() {
        let mut input = input(10_000);
        input.seek(3_000).unwrap();
        assert_eq!(input.seek(100).unwrap(), 3_000);
        assert_eq!(input.position(), 3_000);
    }

    #[test]
    fn test_seek_past_end_stops_at_end() {
        let mut input = input(2_000);
        assert_eq!(input.seek(5_000).unwrap(), 2_000);
    }

    #[test]
    fn test_input_capabilities() {
        let mut input = input(100);
        assert!(!input.is_seekable());
        assert!(input.supports_seek_time());
        assert_eq!(input.seek_time(12_000).unwrap(), 0);
        assert_eq!(input.length(), 100);
        assert_eq!(input.protocol(), Protocol::Tcp);

        let mut header = [0u8; 64];
        assert_eq!(input.preview(&mut header).unwrap(), 16);
        assert_eq!(input.position(), 0);

        input.close();
        let mut buf = [0u8; 8];
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_rejects_other_schemes() {
        let err = MmsInput::open("rtsp://example.com/a", &SessionConfig::default()).err().unwrap();
        assert!(matches!(err, asfstream_common::Error::InvalidUrl(_)));
    }
}
