//! Common error types used throughout asfstream.
//!
//! The variants follow the failure classes a streaming session can hit:
//! a broken container, a server that does not speak the protocol we expect,
//! and transport failures underneath both. Stream corruption inside a healthy
//! container is recovered locally by the demuxer and never surfaces here.

/// Common error type for asfstream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The ASF container is structurally invalid.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// The server answered with something the protocol does not allow.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A socket or file operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The connection could not be established within the configured budget.
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    /// The location could not be parsed or uses an unknown scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The operation is not supported by this source.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The server signalled the end of the stream.
    #[error("End of stream")]
    EndOfStream,
}

impl Error {
    /// Create a new MalformedContainer error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create a new ProtocolViolation error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a new InvalidUrl error.
    pub fn invalid_url<S: Into<String>>(msg: S) -> Self {
        Self::InvalidUrl(msg.into())
    }

    /// Create a new Unsupported error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a Transport error for a read that ended early.
    pub fn short_read(expected: usize, got: usize) -> Self {
        Self::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("short read: expected {} bytes, got {}", expected, got),
        ))
    }

    /// Whether the session can not continue after this error.
    ///
    /// Only a clean end of stream is not fatal; every other class tears the
    /// session down and leaves retry policy to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EndOfStream)
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::malformed("no file object");
        assert_eq!(err.to_string(), "Malformed container: no file object");

        let err = Error::protocol("unexpected response 0x03");
        assert_eq!(err.to_string(), "Protocol violation: unexpected response 0x03");

        let err = Error::ConnectTimeout("example.com:1755".to_string());
        assert_eq!(err.to_string(), "Connection to example.com:1755 timed out");

        assert_eq!(Error::EndOfStream.to_string(), "End of stream");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(Error::invalid_url("x"), Error::InvalidUrl(_)));
        assert!(matches!(Error::unsupported("x"), Error::Unsupported(_)));
        assert!(matches!(Error::short_read(8, 3), Error::Transport(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io.into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_fatal());
        assert!(!Error::EndOfStream.is_fatal());
    }

    #[test]
    fn test_short_read_message() {
        let err = Error::short_read(40, 12);
        assert!(err.to_string().contains("expected 40 bytes, got 12"));
    }
}
