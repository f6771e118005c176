//! Seeking: backward keyframe scan on seekable inputs, resync arming otherwise.
//!
//! The backward scan walks packets from the target towards the start of the
//! data, parsing payload headers without delivering anything:
//!
//! | state                       | event                                   | next                         |
//! |-----------------------------|-----------------------------------------|------------------------------|
//! | `SearchVideoKeyframe`       | keyframe seen, audio selected           | `SearchAudioBeforeKeyframe`  |
//! | `SearchVideoKeyframe`       | keyframe seen, no audio                 | `Found`                      |
//! | `SearchAudioBeforeKeyframe` | audio payload with `0 < ts <= key ts`   | `Found`                      |
//! | `SearchAudioOnly`           | audio payload starting an object        | `Found`                      |
//!
//! Reaching the first packet without `Found` lands on the first packet.

use tracing::debug;

use super::packet::PayloadOutcome;
use super::{AsfDemuxer, DemuxMode, DemuxSink, DemuxStatus, MediaKind};
use crate::Result;
use asfstream_common::InputSource;

/// Where to seek to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Absolute byte position in the input.
    Position(u64),
    /// Milliseconds from the start of the stream.
    Time(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekState {
    SearchVideoKeyframe,
    SearchAudioBeforeKeyframe,
    SearchAudioOnly,
    Found,
}

impl<I: InputSource> AsfDemuxer<I> {
    /// Reposition the demuxer.
    ///
    /// `playing` tells whether delivery already started; time seeks are only
    /// forwarded to non-seekable inputs before playback.
    pub fn seek<S: DemuxSink>(&mut self, target: SeekTarget, playing: bool, sink: &mut S) -> DemuxStatus {
        let sink: &mut dyn DemuxSink = sink;
        self.status = DemuxStatus::Ok;
        if self.mode != DemuxMode::Normal || self.header.is_none() {
            return self.status;
        }

        for state in &mut self.streams {
            state.reset_position();
        }
        self.last_pts = [0; 2];
        self.keyframe_ts = 0;
        self.keyframe_found = false;
        self.send_newpts = true;
        self.buf_flag_seek = true;

        if self.input.is_seekable() {
            if let Err(err) = self.seek_backward(target, sink) {
                debug!(error = %err, "seek failed");
                self.status = DemuxStatus::Finished;
            }
            self.set_delivery(true, true);
        } else {
            if !playing && self.input.supports_seek_time() {
                let time = match target {
                    SeekTarget::Time(ms) => ms,
                    SeekTarget::Position(pos) => {
                        let length = self.input.length();
                        if length == 0 {
                            0
                        } else {
                            let ms = u128::from(self.length_ms) * u128::from(pos) / u128::from(length);
                            u64::try_from(ms).unwrap_or(u64::MAX)
                        }
                    }
                };
                if let Err(err) = self.input.seek_time(time) {
                    debug!(error = %err, time, "time seek rejected by input");
                }
            }
            // streaming mode: video waits for the next keyframe, audio flows
            self.keyframe_ts = 0;
            self.keyframe_found = false;
            self.set_delivery(true, false);
        }
        self.status
    }

    /// Set skip and resync on the video stream, and on the audio stream when
    /// `audio_waits`.
    fn set_delivery(&mut self, video_waits: bool, audio_waits: bool) {
        if let Some(index) = self.selection.video {
            self.streams[index].resync = video_waits;
            self.streams[index].skip = video_waits;
        }
        if let Some(index) = self.selection.audio {
            self.streams[index].resync = audio_waits;
            self.streams[index].skip = audio_waits;
        }
    }

    /// Start of the last packet, bounded by the declared count and the input length.
    fn last_packet_pos(&self) -> u64 {
        let first = self.packet.first_pos;
        let size = u64::from(self.packet.size);
        let mut last = match self.packet.count {
            0 => u64::MAX,
            count => first.saturating_add((count - 1).saturating_mul(size)),
        };
        let length = self.input.length();
        if length >= first.saturating_add(size) {
            last = last.min(length - size);
        }
        last
    }

    fn seek_backward(&mut self, target: SeekTarget, sink: &mut dyn DemuxSink) -> Result<()> {
        let first = self.packet.first_pos;
        let size = u64::from(self.packet.size);

        let mut pos = match target {
            SeekTarget::Position(pos) => pos,
            SeekTarget::Time(ms) => (ms / 1000).saturating_mul(self.byte_rate),
        };
        pos = pos.max(first);
        pos = pos.min(self.last_packet_pos());
        pos -= (pos - first) % size;

        let mut state = match (self.selection.video, self.selection.audio) {
            (Some(_), _) => SeekState::SearchVideoKeyframe,
            (None, Some(_)) => SeekState::SearchAudioOnly,
            (None, None) => {
                debug!("no stream to seek on");
                return Ok(());
            }
        };

        self.set_delivery(true, true);
        for index in [self.selection.video, self.selection.audio].into_iter().flatten() {
            self.streams[index].resync = false;
        }

        let audio_number = self
            .selection
            .audio
            .and_then(|i| self.streams.get(i))
            .map(|s| s.number);

        let mut pending: Vec<(i64, MediaKind)> = Vec::new();
        loop {
            self.input.seek(pos)?;
            let header_size = self.read_error_correction(sink)?;

            self.parse_packet_payloads(header_size, sink, |demux, outcome: PayloadOutcome| {
                let is_audio = audio_number == Some(outcome.stream_number);
                state = match state {
                    SeekState::SearchVideoKeyframe if demux.keyframe_found => {
                        pending.push((outcome.timestamp * 90, MediaKind::Video));
                        if audio_number.is_some() {
                            SeekState::SearchAudioBeforeKeyframe
                        } else {
                            SeekState::Found
                        }
                    }
                    SeekState::SearchAudioBeforeKeyframe
                        if is_audio && outcome.timestamp != 0 && outcome.timestamp <= demux.keyframe_ts =>
                    {
                        SeekState::Found
                    }
                    SeekState::SearchAudioOnly if is_audio && outcome.frag_offset == 0 => {
                        demux.keyframe_found = true;
                        demux.keyframe_ts = outcome.timestamp;
                        pending.push((outcome.timestamp * 90, MediaKind::Audio));
                        SeekState::Found
                    }
                    other => other,
                };
                state == SeekState::Found
            })?;
            for (pts, kind) in pending.drain(..) {
                self.check_newpts(pts, kind, sink);
            }

            if state == SeekState::Found {
                debug!(pos, keyframe_ts = self.keyframe_ts, "seek landed");
                self.input.seek(pos)?;
                return Ok(());
            }
            if pos < first + size {
                break;
            }
            pos -= size;
        }

        debug!("seek reached beginning of the stream");
        self.input.seek(first)?;
        self.keyframe_found = true;
        Ok(())
    }
}
