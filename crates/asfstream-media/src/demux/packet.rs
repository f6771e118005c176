//! Packet-level parsing: alignment, error correction data, packet header and
//! payload headers.

use tracing::{debug, trace};

use super::{AsfDemuxer, DemuxEvent, DemuxSink};
use crate::guid::Guid;
use crate::{Error, Result};
use asfstream_common::InputSource;

/// Whether parsing of the current packet continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    Continue,
    /// The packet is unusable; the next call realigns on the following one.
    SkipPacket,
}

/// Fields shared by every payload header.
#[derive(Debug, Clone, Copy)]
pub(super) struct PayloadHeader {
    pub(super) raw_id: u8,
    /// Compact index, set only for the selected audio or video stream.
    pub(super) stream: Option<usize>,
    pub(super) frag_offset: u32,
    pub(super) rlen: u32,
}

impl PayloadHeader {
    pub(super) fn stream_number(&self) -> u16 {
        u16::from(self.raw_id & 0x7F)
    }

    pub(super) fn keyframe(&self) -> bool {
        self.raw_id & 0x80 != 0
    }
}

/// What one payload yielded, for the seek scan.
#[derive(Debug, Clone, Copy)]
pub(super) struct PayloadOutcome {
    pub(super) stream_number: u16,
    pub(super) frag_offset: u32,
    pub(super) timestamp: i64,
}

impl<I: InputSource> AsfDemuxer<I> {
    pub(super) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let got = self.input.read_fully(buf)?;
        if got != buf.len() {
            return Err(asfstream_common::Error::short_read(buf.len(), got).into());
        }
        Ok(())
    }

    pub(super) fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub(super) fn read_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub(super) fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub(super) fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    pub(super) fn read_guid(&mut self) -> Result<Guid> {
        let mut b = [0u8; 16];
        self.read_exact(&mut b)?;
        Ok(Guid::from_bytes(b))
    }

    /// Read a field whose width is selected by a 2-bit code: absent, u8, u16, u32.
    ///
    /// Returns the value (0 when absent) and the bytes consumed.
    fn read_var(&mut self, selector: u8) -> Result<(u32, i64)> {
        Ok(match selector & 3 {
            1 => (u32::from(self.read_u8()?), 1),
            2 => (u32::from(self.read_u16()?), 2),
            3 => (self.read_u32()?, 4),
            _ => (0, 0),
        })
    }

    /// Length of one payload in a multiple-payload packet. An absent width means u16.
    fn read_payload_length(&mut self) -> Result<(u32, i64)> {
        match (self.packet.frame_flag >> 6) & 3 {
            0 => {
                debug!(frame_flag = self.packet.frame_flag, "invalid payload length type");
                Ok((u32::from(self.read_u16()?), 2))
            }
            selector => self.read_var(selector),
        }
    }

    pub(super) fn skip(&mut self, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let target = self.input.position() + len;
        let reached = self.input.seek(target)?;
        if reached != target {
            return Err(Error::Source(asfstream_common::Error::short_read(
                len as usize,
                reached.saturating_sub(target - len) as usize,
            )));
        }
        Ok(())
    }

    fn multiple_payloads(&self) -> bool {
        self.packet.len_flags & 0x01 != 0
    }

    /// Parse one whole packet, delivering payloads of the selected streams.
    pub(super) fn parse_packet(&mut self, sink: &mut dyn DemuxSink) -> Result<()> {
        self.align_packet(sink)?;
        let header_size = self.read_error_correction(sink)?;
        self.parse_packet_payloads(header_size, sink, |_, _| false)
    }

    /// Parse the packet header and every payload of the current packet.
    ///
    /// `after` sees each payload outcome and stops the packet by returning true.
    pub(super) fn parse_packet_payloads<F>(
        &mut self,
        header_size: i64,
        sink: &mut dyn DemuxSink,
        mut after: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Self, PayloadOutcome) -> bool,
    {
        if self.read_packet_header(header_size)? == Step::SkipPacket {
            return Ok(());
        }

        for _ in 0..(self.packet.frames & 0x3F) {
            let raw_id = self.read_u8()?;
            self.packet.size_left -= 1;

            let Some(payload) = self.read_payload_header(raw_id, sink)? else {
                break;
            };
            let (step, outcome) = if payload.rlen == 1 {
                self.read_grouped_payload(&payload, sink)?
            } else {
                self.read_fragment_payload(&payload, sink)?
            };
            if step == Step::SkipPacket || after(self, outcome) {
                break;
            }
        }
        Ok(())
    }

    /// Move to the next packet boundary. Past the last declared packet a new
    /// Header Object must follow, otherwise the stream is over.
    fn align_packet(&mut self, sink: &mut dyn DemuxSink) -> Result<()> {
        let size = u64::from(self.packet.size);
        let first = self.packet.first_pos;
        let current = self.input.position();

        let rem = current.saturating_sub(first) % size;
        let packet_pos = if rem != 0 { current + size - rem } else { current };
        if packet_pos != current {
            trace!(skipped = packet_pos - current, "last packet not finished");
            let reached = self.input.seek(packet_pos)?;
            if reached != packet_pos {
                return Err(Error::malformed(format!("cannot reach packet at {packet_pos}")));
            }
        }
        self.packet.size_left = 0;

        let packet_num = packet_pos.saturating_sub(first) / size;
        if packet_num >= self.packet.count {
            trace!(packet_num, count = self.packet.count, "end of payload data");
            let guid = self.read_guid()?;
            if guid != Guid::HEADER {
                self.note_unknown_guid(guid);
                return Err(asfstream_common::Error::EndOfStream.into());
            }
            debug!("new header after last packet");
            sink.deliver(DemuxEvent::End);
            self.open_header(sink)?;
        }
        Ok(())
    }

    /// Skip error correction data. A GUID in its place is either a new header
    /// or garbage; garbage packets are skipped whole.
    ///
    /// Returns the bytes consumed from the current packet.
    pub(super) fn read_error_correction(&mut self, sink: &mut dyn DemuxSink) -> Result<i64> {
        loop {
            let flags = self.read_u8()?;
            let mut header_size: i64 = 1;

            let len = flags & 0x0F;
            let opaque = (flags >> 4) & 0x1 != 0;
            let len_type = (flags >> 5) & 0x3;
            let present = flags >> 7 != 0;

            if present && !opaque && len_type == 0 {
                let mut ecc = [0u8; 15];
                self.read_exact(&mut ecc[..len as usize])?;
                header_size += i64::from(len);
                return Ok(header_size);
            }

            let mut raw = [0u8; 16];
            raw[0] = flags;
            self.read_exact(&mut raw[1..])?;
            header_size += 15;
            let guid = Guid::from_bytes(raw);

            if guid == Guid::HEADER {
                debug!("new header inside data");
                sink.deliver(DemuxEvent::End);
                self.open_header(sink)?;
            } else {
                self.note_unknown_guid(guid);
                debug!(flags, "skipping invalid packet");
                let rest = i64::from(self.packet.size) - header_size;
                self.skip(rest.max(0) as u64)?;
            }
        }
    }

    /// Parse the length and property flags, padding and frame count.
    fn read_packet_header(&mut self, mut header_size: i64) -> Result<Step> {
        self.packet.len_flags = self.read_u8()?;
        self.packet.prop_flags = self.read_u8()?;
        header_size += 2;

        let len_flags = self.packet.len_flags;
        let (data_size, n) = self.read_var(len_flags >> 5)?;
        header_size += n;
        let (_sequence, n) = self.read_var(len_flags >> 1)?;
        header_size += n;
        let (padding, n) = self.read_var(len_flags >> 3)?;
        header_size += n;

        // send time and duration
        self.skip(6)?;
        header_size += 6;

        let packet_size = i64::from(self.packet.size);
        let (data_size, padding) = if (len_flags >> 5) & 3 != 0 {
            (i64::from(data_size), packet_size - i64::from(data_size))
        } else {
            (packet_size - i64::from(padding), i64::from(padding))
        };

        if padding > packet_size || padding < 0 {
            debug!(padding, packet_size, "invalid padding size, skipping packet");
            return Ok(Step::SkipPacket);
        }

        if self.multiple_payloads() {
            self.packet.frame_flag = self.read_u8()?;
            header_size += 1;
            self.packet.frames = self.packet.frame_flag & 0x3F;
        } else {
            self.packet.frame_flag = 0;
            self.packet.frames = 1;
        }

        self.packet.size_left = data_size - header_size;
        trace!(
            data_size,
            padding,
            frames = self.packet.frames,
            size_left = self.packet.size_left,
            "packet header"
        );
        Ok(Step::Continue)
    }

    /// Parse the media object number, offset and replicated data length, and
    /// check the media object sequence of selected streams.
    ///
    /// `None` means the rest of the packet is unusable.
    fn read_payload_header(&mut self, raw_id: u8, sink: &mut dyn DemuxSink) -> Result<Option<PayloadHeader>> {
        let number = u16::from(raw_id & 0x7F);
        let selection = self.selection;
        let stream = self
            .header
            .as_ref()
            .and_then(|h| h.index_of(number))
            .filter(|&i| selection.is_selected(i) && self.media_kind(i).is_some());

        let prop_flags = self.packet.prop_flags;
        let mut header_size = 0;

        let seq_type = (prop_flags >> 4) & 3;
        let (seq, n) = self.read_var(seq_type)?;
        header_size += n;

        if let Some(index) = stream {
            let is_video = selection.video == Some(index);
            let state = &mut self.streams[index];
            let mut next = match seq_type {
                1 => {
                    state.seq %= 256;
                    (state.seq + 1) % 256
                }
                2 => {
                    state.seq %= 65_536;
                    (state.seq + 1) % 65_536
                }
                3 => state.seq.wrapping_add(1),
                _ => 0,
            };
            if state.first_seq || state.skip {
                next = seq;
                state.first_seq = false;
            }
            if seq != state.seq && seq != next {
                debug!(number, seq, next, current = state.seq, "bad media object number");
                if let Some(kind) = state.kind {
                    sink.deliver(DemuxEvent::ResetDecoder(kind));
                }
                if is_video {
                    debug!("waiting for keyframe");
                    state.resync = true;
                    state.skip = true;
                    self.keyframe_found = false;
                }
            }
            self.streams[index].seq = seq;
        }

        let (frag_offset, n) = self.read_var(prop_flags >> 2)?;
        header_size += n;
        let (rlen, n) = self.read_var(prop_flags)?;
        header_size += n;

        if i64::from(rlen) > self.packet.size_left {
            debug!(rlen, size_left = self.packet.size_left, "invalid replicated data length");
            return Ok(None);
        }
        self.packet.size_left -= header_size;

        Ok(Some(PayloadHeader {
            raw_id,
            stream,
            frag_offset,
            rlen,
        }))
    }

    /// Keyframe detection for skipping streams, and resync once a keyframe
    /// at or after the stored keyframe timestamp arrives.
    fn track_keyframe(&mut self, index: usize, keyframe: bool, timestamp: i64) {
        let state = &mut self.streams[index];
        if state.skip && keyframe && !self.keyframe_found {
            debug!(timestamp, "keyframe detected");
            self.keyframe_found = true;
            self.keyframe_ts = timestamp;
        }
        if state.resync && self.keyframe_found && timestamp >= self.keyframe_ts {
            debug!(number = state.number, "stream resynced");
            state.resync = false;
            state.skip = false;
        }
    }

    /// A payload carrying one fragment of a media object.
    fn read_fragment_payload(
        &mut self,
        payload: &PayloadHeader,
        sink: &mut dyn DemuxSink,
    ) -> Result<(Step, PayloadOutcome)> {
        let mut header_size: i64 = 0;
        let rlen = payload.rlen;
        let mut timestamp: i64 = 0;

        if rlen >= 8 {
            let object_size = self.read_u32()?;
            timestamp = i64::from(self.read_u32()?);
            if timestamp != 0 {
                timestamp -= self.preroll();
            }
            if let Some(index) = payload.stream {
                self.streams[index].payload_size = object_size;
            }
            self.skip(u64::from(rlen - 8))?;
        } else {
            self.skip(u64::from(rlen))?;
        }
        header_size += i64::from(rlen);

        let frag_len = if self.multiple_payloads() {
            let (len, n) = self.read_payload_length()?;
            header_size += n;
            i64::from(len)
        } else {
            self.packet.size_left - header_size
        };

        let outcome = PayloadOutcome {
            stream_number: payload.stream_number(),
            frag_offset: payload.frag_offset,
            timestamp,
        };

        if frag_len > self.packet.size_left || frag_len < 0 {
            debug!(frag_len, size_left = self.packet.size_left, "invalid fragment length");
            return Ok((Step::SkipPacket, outcome));
        }
        self.packet.size_left -= header_size;

        match payload.stream {
            Some(index) => {
                if payload.frag_offset == 0 {
                    self.track_keyframe(index, payload.keyframe(), timestamp);
                }
                if self.streams[index].skip {
                    trace!(number = payload.stream_number(), "skipping fragment");
                    self.skip(frag_len as u64)?;
                } else {
                    self.deliver_fragment(
                        index,
                        payload.frag_offset,
                        timestamp,
                        frag_len as usize,
                        payload.keyframe(),
                        sink,
                    )?;
                }
            }
            None => self.skip(frag_len as u64)?,
        }
        self.packet.size_left -= frag_len;
        Ok((Step::Continue, outcome))
    }

    /// A payload of small media objects, each prefixed by a length byte,
    /// sharing the timestamp carried in the offset field.
    fn read_grouped_payload(
        &mut self,
        payload: &PayloadHeader,
        sink: &mut dyn DemuxSink,
    ) -> Result<(Step, PayloadOutcome)> {
        let mut timestamp = i64::from(payload.frag_offset);
        if timestamp != 0 {
            timestamp -= self.preroll();
        }
        let outcome = PayloadOutcome {
            stream_number: payload.stream_number(),
            frag_offset: 0,
            timestamp,
        };

        let _delta = self.read_u8()?;
        let mut header_size: i64 = 1;

        let data_length = if self.multiple_payloads() {
            let (len, n) = self.read_payload_length()?;
            header_size += n;
            i64::from(len)
        } else {
            self.packet.size_left - header_size
        };

        if data_length > self.packet.size_left || data_length < 0 {
            debug!(data_length, size_left = self.packet.size_left, "invalid grouped data length");
            return Ok((Step::SkipPacket, outcome));
        }
        self.packet.size_left -= header_size;

        let mut sent: i64 = 0;
        let mut object_ts = timestamp;
        while sent < data_length {
            let object_len = self.read_u8()?;
            match payload.stream {
                Some(index) => {
                    self.streams[index].payload_size = u32::from(object_len);
                    self.track_keyframe(index, payload.keyframe(), object_ts);
                    if self.streams[index].skip {
                        self.skip(u64::from(object_len))?;
                    } else {
                        self.deliver_fragment(
                            index,
                            0,
                            object_ts,
                            usize::from(object_len),
                            payload.keyframe(),
                            sink,
                        )?;
                    }
                    let state = &mut self.streams[index];
                    state.seq = state.seq.wrapping_add(1);
                }
                None => self.skip(u64::from(object_len))?,
            }
            sent += i64::from(object_len) + 1;
            self.packet.size_left -= i64::from(object_len) + 1;
            object_ts = 0;
        }
        Ok((Step::Continue, outcome))
    }

    fn preroll(&self) -> i64 {
        self.header
            .as_ref()
            .map_or(0, |h| i64::try_from(h.file.preroll).unwrap_or(i64::MAX))
    }
}
