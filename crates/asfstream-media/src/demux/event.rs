//! What the demuxer hands to its consumer.

use bytes::Bytes;

use crate::format::{FourCc, WaveFormatEx};

/// Elementary stream category a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub(crate) fn pts_slot(self) -> usize {
        match self {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
        }
    }
}

/// Codec description sent once per selected stream before any frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub kind: MediaKind,
    pub stream_number: u16,
    pub bitrate: u32,
    /// WAVEFORMATEX for audio, BITMAPINFOHEADER onwards for video.
    pub decoder_config: Bytes,
    pub info: StreamInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamInfo {
    Audio(WaveFormatEx),
    Video {
        width: u32,
        height: u32,
        fourcc: FourCc,
        /// Display aspect as (width × x, height × y) when the header carries one.
        aspect: Option<(i64, i64)>,
    },
}

/// A chunk of one media object.
///
/// Objects larger than the configured chunk size are split; `frame_start`
/// and `frame_end` mark the object boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MediaKind,
    pub stream_number: u16,
    pub data: Bytes,
    /// 90 kHz presentation time, 0 when unknown.
    pub pts: i64,
    pub frame_start: bool,
    pub frame_end: bool,
    pub keyframe: bool,
    /// Input position scaled to 0..=65535, 0 when the length is unknown.
    pub input_normpos: u32,
    /// Object timestamp in milliseconds.
    pub input_time: i64,
}

/// Everything a demuxer can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    /// A header was read and stream headers follow.
    Start,
    StreamHeader(StreamHeader),
    Frame(Frame),
    /// The stream's media object numbering broke; decoder state is stale.
    ResetDecoder(MediaKind),
    /// Timestamps jumped; `seek` is set for the first jump after a seek.
    NewPts { pts: i64, seek: bool },
    /// The current header was superseded by a new one in the byte stream.
    End,
}

/// Receives demuxer output.
pub trait DemuxSink {
    fn deliver(&mut self, event: DemuxEvent);
}

impl DemuxSink for Vec<DemuxEvent> {
    fn deliver(&mut self, event: DemuxEvent) {
        self.push(event);
    }
}

impl<S: DemuxSink + ?Sized> DemuxSink for &mut S {
    fn deliver(&mut self, event: DemuxEvent) {
        (**self).deliver(event);
    }
}
