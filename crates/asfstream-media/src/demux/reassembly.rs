//! Fragment delivery and timestamp discontinuity tracking.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::reorder::deinterleave;
use super::{AsfDemuxer, DemuxEvent, DemuxSink, Frame, MediaKind, DEFRAG_BUFFER_SIZE};
use crate::Result;
use asfstream_common::InputSource;

/// Largest pts jump, in 90 kHz ticks, not reported as a discontinuity.
const WRAP_THRESHOLD: i64 = 20 * 90_000;

impl<I: InputSource> AsfDemuxer<I> {
    pub(super) fn deliver_fragment(
        &mut self,
        index: usize,
        frag_offset: u32,
        timestamp: i64,
        frag_len: usize,
        keyframe: bool,
        sink: &mut dyn DemuxSink,
    ) -> Result<()> {
        if self.streams[index].defrag {
            self.deliver_defrag(index, frag_offset, timestamp, frag_len, keyframe, sink)
        } else {
            self.deliver_direct(index, frag_offset, timestamp, frag_len, keyframe, sink)
        }
    }

    /// Report a discontinuity when a seek asked for one or the pts jumped.
    pub(super) fn check_newpts(&mut self, pts: i64, kind: MediaKind, sink: &mut dyn DemuxSink) {
        let slot = kind.pts_slot();
        let last = self.last_pts[slot];

        if pts != 0 && (self.send_newpts || (last != 0 && (pts - last).abs() > WRAP_THRESHOLD)) {
            trace!(pts, last, ?kind, "new pts");
            sink.deliver(DemuxEvent::NewPts {
                pts,
                seek: self.buf_flag_seek,
            });
            self.buf_flag_seek = false;
            self.send_newpts = false;
            self.last_pts[1 - slot] = 0;
        }

        if pts != 0 {
            self.last_pts[slot] = pts;
        }
    }

    fn input_normpos(&self) -> u32 {
        let length = self.input.length();
        if length == 0 {
            return 0;
        }
        (u128::from(self.input.position()) * 65_535 / u128::from(length)) as u32
    }

    /// Returns false and logs when `frag_offset` does not continue the
    /// object being assembled.
    fn continues_object(&self, index: usize, frag_offset: u32) -> bool {
        let state = &self.streams[index];
        if frag_offset != 0 && frag_offset != state.frag_offset {
            debug!(
                number = state.number,
                expected = state.frag_offset,
                got = frag_offset,
                "invalid fragment offset"
            );
            return false;
        }
        true
    }

    /// Forward each fragment as it arrives, in chunks of at most the configured size.
    fn deliver_direct(
        &mut self,
        index: usize,
        frag_offset: u32,
        timestamp: i64,
        frag_len: usize,
        keyframe: bool,
        sink: &mut dyn DemuxSink,
    ) -> Result<()> {
        if frag_offset == 0 {
            self.streams[index].frag_offset = 0;
        } else if !self.continues_object(index, frag_offset) {
            return self.skip(frag_len as u64);
        }

        let Some(kind) = self.streams[index].kind else {
            return self.skip(frag_len as u64);
        };
        let max_chunk = self.config.max_chunk_size.max(1);
        let mut remaining = frag_len;
        let mut timestamp = timestamp;

        while remaining > 0 {
            let size = remaining.min(max_chunk);
            let mut data = vec![0u8; size];
            self.read_exact(&mut data)?;

            let input_normpos = self.input_normpos();
            let pts = timestamp * 90;
            let state = &mut self.streams[index];
            let frame_start = state.frag_offset == 0;
            state.frag_offset += size as u32;
            remaining -= size;
            let frame_end = state.frag_offset >= state.payload_size;
            let stream_number = state.number;

            self.check_newpts(pts, kind, sink);
            sink.deliver(DemuxEvent::Frame(Frame {
                kind,
                stream_number,
                data: Bytes::from(data),
                pts,
                frame_start,
                frame_end,
                keyframe,
                input_normpos,
                input_time: timestamp,
            }));
            timestamp = 0;
        }
        Ok(())
    }

    /// Collect fragments until the object is complete, then forward it whole.
    fn deliver_defrag(
        &mut self,
        index: usize,
        frag_offset: u32,
        timestamp: i64,
        frag_len: usize,
        keyframe: bool,
        sink: &mut dyn DemuxSink,
    ) -> Result<()> {
        if frag_offset == 0 {
            let state = &mut self.streams[index];
            state.frag_offset = 0;
            state.timestamp = timestamp;
            state.keyframe = keyframe;
        } else if !self.continues_object(index, frag_offset) {
            return self.skip(frag_len as u64);
        }

        let start = self.streams[index].frag_offset as usize;
        if start + frag_len > DEFRAG_BUFFER_SIZE {
            warn!(
                number = self.streams[index].number,
                need = start + frag_len,
                "defrag buffer overflow"
            );
            self.skip(frag_len as u64)?;
        } else {
            let state = &mut self.streams[index];
            if state.buffer.len() < DEFRAG_BUFFER_SIZE {
                state.buffer.resize(DEFRAG_BUFFER_SIZE, 0);
            }
            let got = self.input.read_fully(&mut state.buffer[start..start + frag_len])?;
            if got != frag_len {
                return Err(asfstream_common::Error::short_read(frag_len, got).into());
            }
            state.frag_offset += frag_len as u32;
        }

        let state = &mut self.streams[index];
        if state.frag_offset < state.payload_size {
            return Ok(());
        }
        let Some(kind) = state.kind else {
            return Ok(());
        };

        let len = state.frag_offset as usize;
        if kind == MediaKind::Audio && state.reorder.is_interleaved() {
            let reorder = state.reorder;
            deinterleave(&reorder, &mut state.buffer[..len]);
        }
        let object = Bytes::copy_from_slice(&state.buffer[..len]);
        let timestamp = state.timestamp;
        let keyframe = state.keyframe;
        let stream_number = state.number;
        state.frag_offset = 0;

        let pts = timestamp * 90;
        let max_chunk = self.config.max_chunk_size.max(1);
        let mut offset = 0;
        while offset < len {
            let size = (len - offset).min(max_chunk);
            let input_normpos = self.input_normpos();
            let frame_end = offset + size == len;

            self.check_newpts(pts, kind, sink);
            sink.deliver(DemuxEvent::Frame(Frame {
                kind,
                stream_number,
                data: object.slice(offset..offset + size),
                pts,
                frame_start: offset == 0,
                frame_end,
                keyframe,
                input_normpos,
                input_time: timestamp,
            }));
            offset += size;
        }
        Ok(())
    }
}
