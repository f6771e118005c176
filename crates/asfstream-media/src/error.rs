//! Error types for asfstream-media.

use std::io;
use thiserror::Error;

/// Result type for asfstream-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for asfstream-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid ASF structure.
    #[error("Malformed ASF: {0}")]
    Malformed(String),

    /// A required object was never seen.
    #[error("Missing required object: {0}")]
    MissingObject(&'static str),

    /// Unsupported feature or layout.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Buffer too small for operation.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// Error reported by the input source.
    #[error(transparent)]
    Source(#[from] asfstream_common::Error),
}

impl Error {
    /// Create a malformed-structure error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

impl From<Error> for asfstream_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => Self::Transport(e),
            Error::Source(e) => e,
            Error::Unsupported(msg) => Self::Unsupported(msg),
            Error::MissingObject(name) => Self::MalformedContainer(format!("no {name}")),
            other => Self::MalformedContainer(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_common() {
        let err: asfstream_common::Error = Error::MissingObject("file object").into();
        assert_eq!(err.to_string(), "Malformed container: no file object");

        let err: asfstream_common::Error = Error::BufferUnderflow { need: 24, have: 3 }.into();
        assert!(matches!(err, asfstream_common::Error::MalformedContainer(_)));

        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: asfstream_common::Error = Error::from(io).into();
        assert!(matches!(err, asfstream_common::Error::Transport(_)));
    }

    #[test]
    fn test_source_error_passes_through() {
        let err = Error::from(asfstream_common::Error::EndOfStream);
        let back: asfstream_common::Error = err.into();
        assert!(matches!(back, asfstream_common::Error::EndOfStream));
    }
}
