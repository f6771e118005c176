//! MMS session over a raw TCP connection.

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, trace, warn};

use asfstream_common::text::{encode_utf16le, widen_bytes};
use asfstream_common::{Error, Result};
use asfstream_media::{choose_streams, AsfHeader, HeaderParser};

use super::command::{
    command_remaining, id, Command, PacketPrefix, DATA_PACKET_TYPE, HEADER_PACKET_TYPE,
};
use crate::location::{MmsUrl, MMST_PORT};
use crate::transport::Transport;
use crate::{MediaSession, SessionConfig, MAX_STREAM_HEADER_SIZE};

/// Transport negotiation string sent with command 0x02.
const TRANSPORT_INFO: &[u8] = b"\x02\x00\\\\192.168.0.129\\TCP\\1037\x000";

enum Incoming {
    Command(Command),
    Media { packet_type: u8, flags: u8, payload: Vec<u8> },
}

/// What one step of the playback loop produced.
enum Step {
    Packet,
    Control,
    End,
}

/// A connected MMS session.
///
/// Bytes served by [`MmsClient::read`] are the Header Object followed by
/// fixed-size data packets. A new stream announced by the server replays its
/// header before further packets.
pub struct MmsClient {
    transport: Transport,
    url: MmsUrl,
    config: SessionConfig,
    seq_num: u32,
    header: Option<AsfHeader>,
    header_bytes: Vec<u8>,
    header_read: usize,
    packet: Vec<u8>,
    packet_read: usize,
    live: bool,
    playing: bool,
    eos: bool,
    deferred: Option<Error>,
    start_time: f64,
    position: u64,
}

impl MmsClient {
    /// Connect, run the handshake and read the stream header.
    pub fn connect(url: &MmsUrl, config: &SessionConfig) -> Result<Self> {
        let port = url.port_or(MMST_PORT);
        let transport = Transport::connect(&url.host, port, &config.transport)?;
        let mut client = Self {
            transport,
            url: url.clone(),
            config: config.clone(),
            seq_num: 0,
            header: None,
            header_bytes: Vec::new(),
            header_read: 0,
            packet: Vec::new(),
            packet_read: 0,
            live: false,
            playing: false,
            eos: false,
            deferred: None,
            start_time: 0.0,
            position: 0,
        };
        client.handshake()?;
        info!(url = %client.url, live = client.live, header = client.header_bytes.len(), "mms connected");
        Ok(client)
    }

    fn handshake(&mut self) -> Result<()> {
        let guid = self.config.client_guid().to_string().to_uppercase();
        let info = format!("\u{1c}\u{3}NSPlayer/7.0.0.1956; {{{guid}}}; Host: {}", self.url.host);
        let mut body = encode_utf16le(&info);
        body.extend_from_slice(&[0u8; 8]);
        self.send_command(id::CONNECT_INFO, 0, 0x0004_000B, body)?;
        self.expect_answer(id::CONNECT_INFO, "connect info")?;

        let mut body = vec![0u8; 8];
        body.extend_from_slice(&widen_bytes(TRANSPORT_INFO));
        self.send_command(id::TRANSPORT, 0, 0, body)?;
        match self.get_answer()?.command {
            id::TRANSPORT => {}
            id::TRANSPORT_FAILED => return Err(Error::protocol("server refused the TCP transport")),
            other => return Err(Error::protocol(format!("unexpected answer 0x{other:02x} to transport"))),
        }

        let mut body = vec![0u8; 8];
        body.extend_from_slice(&encode_utf16le(&self.url.media_path()));
        body.extend_from_slice(&[0u8; 4]);
        self.send_command(id::REQUEST_FILE, 1, 0xFFFF_FFFF, body)?;
        let answer = self.get_answer()?;
        match answer.command {
            id::FILE_INFO => {
                let flags = answer.body.get(14..16).unwrap_or(&[0u8, 0][..]);
                self.live = flags[0] == 0 && flags[1] & 0x0F == 2;
            }
            id::AUTH_REQUIRED => return Err(Error::unsupported("MMS authentication")),
            other => return Err(Error::protocol(format!("unexpected answer 0x{other:02x} to file request"))),
        }

        let mut body = BytesMut::with_capacity(40);
        for word in [0, 0x0080_0000, 0xFFFF_FFFF, 0, 0, 0, 0, 0x40AC_2000, 2, 0u32] {
            body.put_u32_le(word);
        }
        self.send_command(id::REQUEST_HEADER, 1, 0, body.to_vec())?;
        self.expect_answer(id::HEADER_INFO, "header request")?;

        self.read_stream_header()?;
        self.select_streams()
    }

    fn send_command(&mut self, command: u16, prefix1: u32, prefix2: u32, body: Vec<u8>) -> Result<()> {
        let frame = Command::new(command, prefix1, prefix2, body).seq(self.seq_num).encode();
        self.seq_num = self.seq_num.wrapping_add(1);
        trace!(command = format_args!("0x{command:02x}"), len = frame.len(), "send command");
        self.transport.write_all(&frame)
    }

    fn next_packet(&mut self) -> Result<Incoming> {
        let mut prefix = [0u8; 8];
        self.transport.read_exact(&mut prefix)?;
        match PacketPrefix::parse(&prefix)? {
            PacketPrefix::Command { .. } => {
                let mut length_word = [0u8; 4];
                self.transport.read_exact(&mut length_word)?;
                let remaining = command_remaining(length_word)?;
                let mut frame = Vec::with_capacity(12 + remaining);
                frame.extend_from_slice(&prefix);
                frame.extend_from_slice(&length_word);
                frame.extend_from_slice(&self.transport.read_vec(remaining)?);
                let command = Command::decode(&frame)?;
                trace!(command = format_args!("0x{:02x}", command.command), "received command");
                Ok(Incoming::Command(command))
            }
            PacketPrefix::Media {
                packet_type,
                flags,
                len,
                ..
            } => {
                let payload = self.transport.read_vec(len)?;
                Ok(Incoming::Media {
                    packet_type,
                    flags,
                    payload,
                })
            }
        }
    }

    /// Next command from the server, answering keepalives on the way.
    fn get_answer(&mut self) -> Result<Command> {
        loop {
            match self.next_packet()? {
                Incoming::Command(cmd) if cmd.command == id::KEEPALIVE => {
                    self.send_command(id::KEEPALIVE, 0, 0, Vec::new())?;
                }
                Incoming::Command(cmd) => return Ok(cmd),
                Incoming::Media { packet_type, payload, .. } => {
                    warn!(packet_type, len = payload.len(), "media packet while waiting for a command");
                }
            }
        }
    }

    fn expect_answer(&mut self, expected: u16, step: &str) -> Result<()> {
        let answer = self.get_answer()?;
        if answer.command != expected {
            return Err(Error::protocol(format!(
                "unexpected answer 0x{:02x} to {step}",
                answer.command
            )));
        }
        Ok(())
    }

    /// Collect header packets until the server flags the last one, then parse.
    fn read_stream_header(&mut self) -> Result<()> {
        self.header_bytes.clear();
        self.header_read = 0;
        loop {
            match self.next_packet()? {
                Incoming::Command(cmd) if cmd.command == id::KEEPALIVE => {
                    self.send_command(id::KEEPALIVE, 0, 0, Vec::new())?;
                }
                Incoming::Command(cmd) => {
                    warn!(command = format_args!("0x{:02x}", cmd.command), "unexpected command while reading header");
                }
                Incoming::Media { flags, payload, .. } => {
                    if self.header_bytes.len() + payload.len() > MAX_STREAM_HEADER_SIZE {
                        return Err(Error::malformed(format!(
                            "stream header larger than {MAX_STREAM_HEADER_SIZE} bytes"
                        )));
                    }
                    self.header_bytes.extend_from_slice(&payload);
                    if flags == 0x08 || flags == 0x0C {
                        break;
                    }
                }
            }
        }

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
            file_size = header.file.file_size,
            streams = header.stream_count(),
            "header parsed"
        );
        self.header = Some(header);
        Ok(())
    }

    /// Tell the server which streams to send.
    fn select_streams(&mut self) -> Result<()> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| Error::malformed("no stream header"))?;
        let selection = choose_streams(header, self.config.bandwidth);
        let streams: Vec<(u16, bool)> = header
            .streams()
            .map(|(index, stream)| (stream.stream_number, selection.is_selected(index)))
            .collect();
        let Some(&(first, _)) = streams.first() else {
            return Err(Error::malformed("header declares no streams"));
        };
        info!(
            video = ?selection.video,
            audio = ?selection.audio,
            bandwidth = self.config.bandwidth,
            "selected streams"
        );

        let mut body = BytesMut::with_capacity(streams.len() * 6 + 2);
        body.put_u16_le(0);
        for &(number, selected) in &streams[1..] {
            body.put_u16_le(0xFFFF);
            body.put_u16_le(number);
            body.put_u16_le(if selected { 0x0000 } else { 0x0002 });
        }
        body.put_bytes(0, 6);
        self.send_command(
            id::SELECT_STREAMS,
            streams.len() as u32,
            0xFFFF | u32::from(first) << 16,
            body.to_vec(),
        )?;

        let answer = self.get_answer()?;
        if answer.command != id::STREAM_SELECTED {
            warn!(command = format_args!("0x{:02x}", answer.command), "unexpected answer to stream selection");
        }
        Ok(())
    }

    fn start_play(&mut self, start_time: f64) -> Result<()> {
        let mut body = BytesMut::with_capacity(24);
        body.put_f64_le(start_time);
        body.put_u32_le(0xFFFF_FFFF);
        body.put_u32_le(0xFFFF_FFFF);
        body.put_slice(&[0xFF, 0xFF, 0xFF, 0x00]);
        body.put_u32_le(u32::from(DATA_PACKET_TYPE));
        debug!(start_time, "start play");
        self.send_command(id::START_PLAY, 1, 0x0001_FFFF, body.to_vec())
    }

    fn packet_size(&self) -> usize {
        self.header.as_ref().map_or(0, |h| h.file.packet_size as usize)
    }

    fn next_media_step(&mut self) -> Result<Step> {
        match self.next_packet()? {
            Incoming::Command(cmd) => {
                match cmd.command {
                    id::END_OF_STREAM => {
                        debug!(code = cmd.prefix1, "end of current stream");
                        if cmd.prefix1 == 0 {
                            return Ok(Step::End);
                        }
                    }
                    id::NEW_STREAM => {
                        info!("server announced a new stream");
                        self.read_stream_header()?;
                        self.select_streams()?;
                        self.start_play(0.0)?;
                    }
                    id::KEEPALIVE => self.send_command(id::KEEPALIVE, 0, 0, Vec::new())?,
                    id::REQUEST_FILE => {}
                    other => warn!(command = format_args!("0x{other:02x}"), "unexpected command"),
                }
                Ok(Step::Control)
            }
            Incoming::Media { packet_type, .. } if packet_type == HEADER_PACKET_TYPE => {
                warn!("unexpected header packet during playback");
                Ok(Step::Control)
            }
            Incoming::Media { mut payload, .. } => {
                let packet_size = self.packet_size();
                if payload.len() > packet_size {
                    return Err(Error::protocol(format!(
                        "media packet of {} bytes exceeds packet size {packet_size}",
                        payload.len()
                    )));
                }
                payload.resize(packet_size, 0);
                self.packet = payload;
                self.packet_read = 0;
                Ok(Step::Packet)
            }
        }
    }

    /// Serve header bytes, then packets. Returns 0 at the end of the stream.
    ///
    /// A read that reaches the end of the header stops there.
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
                if let Err(err) = self.start_play(self.start_time) {
                    self.eos = true;
                    return self.fail(total, err);
                }
                self.playing = true;
            }

            if self.packet_read == self.packet.len() {
                self.packet.clear();
                self.packet_read = 0;
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

    /// Report `err` now, or after the bytes already copied were returned.
    fn fail(&mut self, total: usize, err: Error) -> Result<usize> {
        warn!(error = %err, "mms session failed");
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
        self.live
    }
}

impl MediaSession for MmsClient {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        MmsClient::read(self, buf)
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
        self.start_time = time_ms as f64 / 1000.0;
    }

    fn close(&mut self) {
        self.transport.shutdown();
        self.eos = true;
    }
}
