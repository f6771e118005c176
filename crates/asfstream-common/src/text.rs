//! UTF-16LE string helpers.
//!
//! ASF headers and MMS commands carry strings as little-endian UTF-16. Wire
//! strings are usually NUL terminated, and everything from the first NUL code
//! unit on is ignored.

use serde::{Deserialize, Serialize};

/// Strategy used to turn wire UTF-16LE into UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Utf16Codec {
    /// Full Unicode decoding; unpaired surrogates become U+FFFD.
    #[default]
    Unicode,
    /// ASCII transliteration: any code unit outside 0x00..0x7F becomes `?`.
    Ascii,
}

impl Utf16Codec {
    /// Decode a UTF-16LE byte string, stopping at the first NUL code unit.
    ///
    /// A trailing odd byte is dropped.
    pub fn decode(self, bytes: &[u8]) -> String {
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0);

        match self {
            Self::Unicode => char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
            Self::Ascii => units
                .map(|unit| if unit < 0x80 { unit as u8 as char } else { '?' })
                .collect(),
        }
    }
}

/// Decode UTF-16LE bytes to a UTF-8 string with the default codec.
pub fn decode_utf16le_to_utf8(bytes: &[u8]) -> String {
    Utf16Codec::default().decode(bytes)
}

/// Encode a string as UTF-16LE without a terminator.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Widen raw bytes to UTF-16LE code units, one unit per byte.
///
/// Used for MMS command bodies whose templates contain embedded NUL and
/// control bytes that must survive verbatim.
pub fn widen_bytes(raw: &[u8]) -> Vec<u8> {
    raw.iter().flat_map(|&b| [b, 0]).collect()
}
