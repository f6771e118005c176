//! Blocking TCP transport shared by the MMS and MMSH clients.
//!
//! Connection setup polls in short waits up to a total budget instead of
//! blocking once, so an unreachable server fails with
//! [`Error::ConnectTimeout`] after a bounded time.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use asfstream_common::{Error, Result};

/// Timeouts applied to every connection a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Total time allowed for the TCP connect.
    pub connect_timeout: Duration,
    /// Length of one connect wait.
    pub poll_interval: Duration,
    /// Read and write timeout once connected. `None` blocks forever.
    pub read_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(15_000),
            poll_interval: Duration::from_millis(500),
            read_timeout: Some(Duration::from_millis(30_000)),
        }
    }
}

/// A connected socket with buffered reads.
#[derive(Debug)]
pub struct Transport {
    reader: BufReader<TcpStream>,
    peer: String,
}

impl Transport {
    /// Connect to `host:port`, polling every `poll_interval` until
    /// `connect_timeout` has elapsed.
    pub fn connect(host: &str, port: u16, config: &TransportConfig) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{peer} did not resolve"),
            )));
        }

        let deadline = Instant::now() + config.connect_timeout;
        let mut attempts = 0u32;
        loop {
            let mut refused: Option<io::Error> = None;
            let mut pending = false;
            for addr in &addrs {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    debug!(%peer, attempts, "connect budget exhausted");
                    return Err(Error::ConnectTimeout(peer));
                }
                attempts += 1;
                match TcpStream::connect_timeout(addr, config.poll_interval.min(left)) {
                    Ok(stream) => {
                        debug!(%peer, %addr, attempts, "connected");
                        return Self::from_stream(stream, peer, config);
                    }
                    Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                        trace!(%addr, "connect still pending");
                        pending = true;
                    }
                    Err(err) => {
                        trace!(%addr, error = %err, "connect failed");
                        refused = Some(err);
                    }
                }
            }
            if let (false, Some(err)) = (pending, refused) {
                return Err(Error::Transport(err));
            }
        }
    }

    fn from_stream(stream: TcpStream, peer: String, config: &TransportConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.read_timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream),
            peer,
        })
    }

    /// `host:port` this transport was opened for.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Fill `buf` completely or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            match self.reader.read(&mut buf[got..]) {
                Ok(0) => return Err(Error::short_read(buf.len(), got)),
                Ok(n) => got += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Read `len` bytes into a new buffer.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read one line, without its `\r\n` or `\n` terminator.
    pub fn read_line(&mut self) -> Result<String> {
        let mut raw = Vec::with_capacity(128);
        let n = self.reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Err(Error::short_read(1, 0));
        }
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    /// Close both directions. Further reads fail.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.reader.get_ref().shutdown(Shutdown::Both) {
            trace!(peer = %self.peer, error = %err, "shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn quick() -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(100),
            read_timeout: Some(Duration::from_millis(2_000)),
        }
    }

    #[test]
    fn test_read_exact_and_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"HTTP/1.0 200 OK\r\nX: y\r\n\r\nabcd").unwrap();
            let mut echo = [0u8; 3];
            sock.read_exact(&mut echo).unwrap();
            echo
        });

        let mut transport = Transport::connect("127.0.0.1", port, &quick()).unwrap();
        assert_eq!(transport.peer(), format!("127.0.0.1:{port}"));
        assert_eq!(transport.read_line().unwrap(), "HTTP/1.0 200 OK");
        assert_eq!(transport.read_line().unwrap(), "X: y");
        assert_eq!(transport.read_line().unwrap(), "");
        assert_eq!(transport.read_vec(4).unwrap(), b"abcd");
        transport.write_all(b"xyz").unwrap();
        assert_eq!(&server.join().unwrap(), b"xyz");
    }

    #[test]
    fn test_short_read_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"ab").unwrap();
        });

        let mut transport = Transport::connect("127.0.0.1", port, &quick()).unwrap();
        server.join().unwrap();
        let mut buf = [0u8; 8];
        let err = transport.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("expected 8 bytes, got 2"));
    }

    #[test]
    fn test_refused_connection_fails_fast() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let started = Instant::now();
        let err = Transport::connect("127.0.0.1", port, &quick()).unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::ConnectTimeout(_)));
        assert!(started.elapsed() < Duration::from_millis(2_500));
    }
}
