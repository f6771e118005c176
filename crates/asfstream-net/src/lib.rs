//! Asfstream-Net: MMS streaming clients.
//!
//! Two transports carry the same ASF stream:
//!
//! - **MMS over TCP** ([`mms::MmsClient`]): a binary command protocol on port 1755
//! - **MMS over HTTP** ([`mmsh::MmshClient`]): chunked responses to templated
//!   `GET` requests on port 80
//!
//! Both serve the caller a byte stream that starts with the Header Object and
//! continues with fixed-size data packets, so the demuxer can read a network
//! session exactly like a file. [`MmsInput`] picks the transport from the
//! URL scheme and adapts a session to [`asfstream_common::InputSource`].
//!
//! # Example
//!
//! ```no_run
//! use asfstream_common::InputSource;
//! use asfstream_net::{MmsInput, SessionConfig};
//!
//! # fn main() -> asfstream_common::Result<()> {
//! let mut input = MmsInput::open("mms://media.example.com/clip.wmv", &SessionConfig::default())?;
//! let mut header = vec![0u8; 8192];
//! let n = input.preview(&mut header)?;
//! println!("{n} header bytes, {} bytes total", input.length());
//! # Ok(())
//! # }
//! ```

pub mod input;
pub mod location;
pub mod mms;
pub mod mmsh;
pub mod transport;

use uuid::Uuid;

use asfstream_common::{BandwidthPreset, Protocol, Result, Utf16Codec};

pub use input::MmsInput;
pub use location::{MmsUrl, Scheme};
pub use transport::TransportConfig;

/// Largest header a streaming server may send.
pub const MAX_STREAM_HEADER_SIZE: usize = 8192;

/// Settings shared by every session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Bits per second available for the chosen streams.
    pub bandwidth: u32,
    /// Transport used for `mms://` locations.
    pub protocol: Protocol,
    pub transport: TransportConfig,
    /// Fixed client GUID. A random one is used per MMS session otherwise.
    pub client_guid: Option<Uuid>,
    /// Decoding of UTF-16 strings in the header.
    pub text_codec: Utf16Codec,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bandwidth: BandwidthPreset::default().bits_per_second(),
            protocol: Protocol::Auto,
            transport: TransportConfig::default(),
            client_guid: None,
            text_codec: Utf16Codec::default(),
        }
    }
}

impl SessionConfig {
    /// The configured client GUID or a fresh random one.
    pub fn client_guid(&self) -> Uuid {
        self.client_guid.unwrap_or_else(Uuid::new_v4)
    }
}

/// A negotiated streaming session.
///
/// [`MediaSession::read`] first serves the Header Object, then data packets
/// padded to the packet size.
pub trait MediaSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Copy the start of the header without consuming anything.
    fn peek_header(&self, buf: &mut [u8]) -> usize;

    /// File size announced in the header, 0 for broadcasts that omit it.
    fn length(&self) -> u64;

    /// Bytes served so far.
    fn position(&self) -> u64;

    /// Start time for playback that has not started yet.
    fn set_start_time(&mut self, time_ms: u64);

    /// Close the connection. Later reads return 0.
    fn close(&mut self);
}
