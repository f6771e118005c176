//! MMS session tunneled over HTTP.
//!
//! Negotiation takes two requests on two connections. The first fetches the
//! header so streams can be chosen; the second, sent when the caller first
//! reads past the header, names the chosen streams and starts the packets.

use tracing::{debug, info, trace, warn};

use asfstream_common::{Error, Result};
use asfstream_media::{choose_streams, disable_streams, AsfHeader, HeaderParser};

use super::chunk::{ChunkHeader, ChunkType, CHUNK_HEADER_LEN};
use super::request::{RequestTarget, ResponseHead, StreamKind, DEFAULT_CLIENT_GUID};
use crate::location::{MmsUrl, MMSH_PORT};
use crate::transport::Transport;
use crate::{MediaSession, SessionConfig, MAX_STREAM_HEADER_SIZE};

enum Step {
    Packet,
    Control,
    End,
}

fn read_chunk_header(transport: &mut Transport) -> Result<ChunkHeader> {
    let mut raw = [0u8; CHUNK_HEADER_LEN];
    transport.read_exact(&mut raw)?;
    let chunk_type = ChunkType::from_u16(u16::from_le_bytes([raw[0], raw[1]]));
    let ext = transport.read_vec(chunk_type.ext_len())?;
    let chunk = ChunkHeader::parse(raw, &ext)?;
    trace!(chunk_type = ?chunk.chunk_type, len = chunk.length, value = chunk.value, "chunk");
    Ok(chunk)
}

/// Append header chunks to `out` and return the first chunk that is not one.
fn read_header_chunks(transport: &mut Transport, out: &mut Vec<u8>) -> Result<ChunkHeader> {
    out.clear();
    loop {
        let chunk = read_chunk_header(transport)?;
        if chunk.chunk_type != ChunkType::AsfHeader {
            return Ok(chunk);
        }
        if out.len() + chunk.length > MAX_STREAM_HEADER_SIZE {
            return Err(Error::malformed(format!(
                "stream header larger than {MAX_STREAM_HEADER_SIZE} bytes"
            )));
        }
        out.extend_from_slice(&transport.read_vec(chunk.length)?);
    }
}

/// Read the status line and headers up to the blank line.
fn read_response(transport: &mut Transport) -> Result<ResponseHead> {
    let mut lines = Vec::new();
    loop {
        let line = transport.read_line()?;
        if line.is_empty() {
            break;
        }
        trace!(%line, "response");
        lines.push(line);
    }
    ResponseHead::parse(&lines)
}

/// A connected MMSH session.
///
/// Bytes served by [`MmshClient::read`] are the Header Object followed by
/// data packets padded to the packet size. When the server restarts the
/// stream the header is not served again.
pub struct MmshClient {
    transport: Option<Transport>,
    url: MmsUrl,
    port: u16,
    config: SessionConfig,
    stream_kind: StreamKind,
    header: Option<AsfHeader>,
    header_bytes: Vec<u8>,
    header_read: usize,
    streams: Vec<(u16, bool)>,
    packet: Vec<u8>,
    packet_read: usize,
    playing: bool,
    eos: bool,
    deferred: Option<Error>,
    start_time_ms: u32,
    position: u64,
}

impl MmshClient {
    /// Fetch and parse the header, then open the playback connection.
    pub fn connect(url: &MmsUrl, config: &SessionConfig) -> Result<Self> {
        let mut client = Self {
            transport: None,
            url: url.clone(),
            port: url.port_or(MMSH_PORT),
            config: config.clone(),
            stream_kind: StreamKind::Seekable,
            header: None,
            header_bytes: Vec::new(),
            header_read: 0,
            streams: Vec::new(),
            packet: Vec::new(),
            packet_read: 0,
            playing: false,
            eos: false,
            deferred: None,
            start_time_ms: 0,
            position: 0,
        };
        client.negotiate_header()?;
        info!(url = %client.url, kind = ?client.stream_kind, header = client.header_bytes.len(), "mmsh connected");
        Ok(client)
    }

    fn client_guid(&self) -> String {
        self.config
            .client_guid
            .map_or_else(|| DEFAULT_CLIENT_GUID.to_string(), |guid| guid.to_string())
    }

    fn open(&self) -> Result<Transport> {
        Transport::connect(&self.url.host, self.port, &self.config.transport)
    }

    /// First request: read the header on a throwaway connection, choose
    /// streams, then reconnect for playback.
    fn negotiate_header(&mut self) -> Result<()> {
        if let Some(mut old) = self.transport.take() {
            old.shutdown();
        }
        let guid = self.client_guid();
        let request = RequestTarget {
            uri: &self.url.uri,
            host: &self.url.host,
            port: self.port,
            client_guid: &guid,
        }
        .first();

        let mut transport = self.open()?;
        transport.write_all(request.as_bytes())?;
        let head = read_response(&mut transport)?;
        self.stream_kind = head.stream_kind.unwrap_or_else(|| {
            debug!("server did not describe the stream, assuming seekable");
            StreamKind::Seekable
        });

        let mut header_bytes = Vec::new();
        match read_header_chunks(&mut transport, &mut header_bytes) {
            Ok(next) => trace!(next = ?next.chunk_type, "header complete"),
            Err(err) if !header_bytes.is_empty() => debug!(error = %err, "probe connection ended early"),
            Err(err) => return Err(err),
        }
        transport.shutdown();

        self.header_bytes = header_bytes;
        self.parse_header()?;
        self.select_streams()?;
        self.transport = Some(self.open()?);
        self.playing = false;
        Ok(())
    }

    fn parse_header(&mut self) -> Result<()> {
        if self.header_bytes.len() < 24 {
            return Err(Error::malformed(format!("stream header of {} bytes", self.header_bytes.len())));
        }
        let header = HeaderParser::with_codec(self.config.text_codec).parse(&self.header_bytes[24..])?;
        if header.file.packet_size == 0 {
            return Err(Error::malformed("packet size is zero"));
        }
        debug!(
            len = self.header_bytes.len(),
            packet_size = header.file.packet_size,
            streams = header.stream_count(),
            "header parsed"
        );
        self.header = Some(header);
        Ok(())
    }

    /// Choose streams and zero the bitrates of the others in the served header.
    fn select_streams(&mut self) -> Result<()> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| Error::malformed("no stream header"))?;
        let selection = choose_streams(header, self.config.bandwidth);
        disable_streams(header, &mut self.header_bytes[24..], selection);
        self.streams = header
            .streams()
            .map(|(index, stream)| (stream.stream_number, selection.is_selected(index)))
            .collect();
        info!(
            video = ?selection.video,
            audio = ?selection.audio,
            bandwidth = self.config.bandwidth,
            "selected streams"
        );
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Transport> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::protocol("connection already closed"))
    }

    /// Second request: ask for the chosen streams and load the first packet.
    fn start_playback(&mut self) -> Result<()> {
        let guid = self.client_guid();
        let target = RequestTarget {
            uri: &self.url.uri,
            host: &self.url.host,
            port: self.port,
            client_guid: &guid,
        };
        let request = match self.stream_kind {
            StreamKind::Seekable => target.seekable(self.start_time_ms, &self.streams),
            StreamKind::Live => target.live(&self.streams),
        };
        debug!(start_ms = self.start_time_ms, kind = ?self.stream_kind, "start playback");

        let transport = self.transport()?;
        transport.write_all(request.as_bytes())?;
        read_response(transport)?;
        let mut repeated = Vec::new();
        let first = read_header_chunks(transport, &mut repeated)?;
        if first.chunk_type != ChunkType::Data {
            return Err(Error::protocol(format!(
                "expected a data chunk after the header, got {:?}",
                first.chunk_type
            )));
        }
        trace!(len = repeated.len(), "playback header skipped");
        self.load_packet(first)
    }

    fn load_packet(&mut self, chunk: ChunkHeader) -> Result<()> {
        let packet_size = self.header.as_ref().map_or(0, |h| h.file.packet_size as usize);
        if chunk.length > packet_size {
            return Err(Error::protocol(format!(
                "data chunk of {} bytes exceeds packet size {packet_size}",
                chunk.length
            )));
        }
        let mut packet = self.transport()?.read_vec(chunk.length)?;
        packet.resize(packet_size, 0);
        self.packet = packet;
        self.packet_read = 0;
        Ok(())
    }

    fn next_media_step(&mut self) -> Result<Step> {
        let chunk = read_chunk_header(self.transport()?)?;
        match chunk.chunk_type {
            ChunkType::End if !chunk.continues() => Ok(Step::End),
            ChunkType::End => {
                info!("server restarted the stream");
                self.negotiate_header()?;
                self.header_read = self.header_bytes.len();
                Ok(Step::Control)
            }
            ChunkType::Data => {
                self.load_packet(chunk)?;
                Ok(Step::Packet)
            }
            ChunkType::Reset => {
                if chunk.length != 0 {
                    return Err(Error::protocol(format!("reset chunk carries {} bytes", chunk.length)));
                }
                let mut header_bytes = Vec::new();
                let next = read_header_chunks(self.transport()?, &mut header_bytes)?;
                if next.chunk_type != ChunkType::Data {
                    return Err(Error::protocol(format!(
                        "expected a data chunk after the new header, got {:?}",
                        next.chunk_type
                    )));
                }
                info!(len = header_bytes.len(), "server replaced the header");
                self.header_bytes = header_bytes;
                self.parse_header()?;
                self.header_read = self.header_bytes.len();
                self.load_packet(next)?;
                Ok(Step::Packet)
            }
            ChunkType::Other(value) => Err(Error::protocol(format!("unexpected chunk type 0x{value:04x}"))),
        }
    }

    /// Serve header bytes, then packets. Returns 0 at the end of the stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() && !self.eos {
            if self.header_read < self.header_bytes.len() {
                let n = (self.header_bytes.len() - self.header_read).min(buf.len() - total);
                buf[total..total + n].copy_from_slice(&self.header_bytes[self.header_read..self.header_read + n]);
                self.header_read += n;
                total += n;
                self.position += n as u64;
                if self.header_read == self.header_bytes.len() {
                    break;
                }
                continue;
            }

            if !self.playing {
                if let Err(err) = self.start_playback() {
                    self.eos = true;
                    return self.fail(total, err);
                }
                self.playing = true;
            }

            if self.packet_read == self.packet.len() {
                match self.next_media_step() {
                    Ok(Step::Packet) => {}
                    Ok(Step::Control) => continue,
                    Ok(Step::End) => {
                        self.eos = true;
                        break;
                    }
                    Err(err) => {
                        self.eos = true;
                        return self.fail(total, err);
                    }
                }
            }

            let n = (self.packet.len() - self.packet_read).min(buf.len() - total);
            buf[total..total + n].copy_from_slice(&self.packet[self.packet_read..self.packet_read + n]);
            self.packet_read += n;
            total += n;
            self.position += n as u64;
        }

        if total == 0 {
            if let Some(err) = self.deferred.take() {
                return Err(err);
            }
        }
        Ok(total)
    }

    fn fail(&mut self, total: usize, err: Error) -> Result<usize> {
        warn!(error = %err, "mmsh session failed");
        if total == 0 {
            return Err(err);
        }
        self.deferred = Some(err);
        Ok(total)
    }

    pub fn header(&self) -> Option<&AsfHeader> {
        self.header.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.stream_kind == StreamKind::Live
    }
}

impl MediaSession for MmshClient {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        MmshClient::read(self, buf)
    }

    fn peek_header(&self, buf: &mut [u8]) -> usize {
        let n = self.header_bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&self.header_bytes[..n]);
        n
    }

    fn length(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.file.file_size)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_start_time(&mut self, time_ms: u64) {
        self.start_time_ms = u32::try_from(time_ms).unwrap_or(u32::MAX);
    }

    fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown();
        }
        self.eos = true;
    }
}
