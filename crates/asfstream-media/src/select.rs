//! Bandwidth-driven stream selection.

use tracing::{debug, trace};

use crate::guid::StreamType;
use crate::header::AsfHeader;

/// Compact indices of the chosen streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct StreamSelection {
    pub video: Option<usize>,
    pub audio: Option<usize>,
}

impl StreamSelection {
    pub fn is_selected(&self, index: usize) -> bool {
        self.video == Some(index) || self.audio == Some(index)
    }
}

/// Pick the stream of `kind` that best fits `bandwidth`.
///
/// The largest bitrate not above the budget wins; failing that, the smallest
/// bitrate above it. Ties keep the earliest slot.
fn choose_stream(header: &AsfHeader, kind: StreamType, bandwidth: u32) -> Option<usize> {
    let mut max_fit: Option<usize> = None;
    let mut min_over: Option<usize> = None;

    for (index, stream) in header.streams() {
        if stream.stream_type != kind {
            continue;
        }
        let bitrate = header.bitrate(index);
        if bitrate <= bandwidth {
            if max_fit.map_or(true, |m| bitrate > header.bitrate(m)) {
                max_fit = Some(index);
            }
        } else if min_over.map_or(true, |m| bitrate < header.bitrate(m)) {
            min_over = Some(index);
        }
    }
    max_fit.or(min_over)
}

/// Choose a video stream, then an audio stream from what is left of `bandwidth`.
pub fn choose_streams(header: &AsfHeader, bandwidth: u32) -> StreamSelection {
    let mut left = bandwidth;

    let video = choose_stream(header, StreamType::Video, left);
    if let Some(index) = video {
        left = left.saturating_sub(header.bitrate(index));
        trace!(index, left, "video stream chosen");
    }

    let audio = choose_stream(header, StreamType::Audio, left);
    if let Some(index) = audio {
        left = left.saturating_sub(header.bitrate(index));
        trace!(index, left, "audio stream chosen");
    }

    StreamSelection { video, audio }
}

/// Zero the bitrate of every audio or video stream that is not selected.
///
/// `buffer` must be the byte buffer `header` was parsed from. Streams without
/// a bitrate entry are left alone.
pub fn disable_streams(header: &AsfHeader, buffer: &mut [u8], selection: StreamSelection) {
    for (index, stream) in header.streams() {
        let chosen = match stream.stream_type {
            StreamType::Video => selection.video,
            StreamType::Audio => selection.audio,
            _ => continue,
        };
        if chosen == Some(index) {
            continue;
        }
        let Some(offset) = header.slots[index].bitrate_offset else {
            continue;
        };
        if let Some(field) = buffer.get_mut(offset..offset + 4) {
            field.fill(0);
            debug!(number = stream.stream_number, "stream disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{AsfFile, HEADER_OBJECT_PREFIX};
    use crate::writer::{HeaderWriter, StreamSpec};

    fn header_bytes(streams: &[(u16, StreamType, u32)]) -> Vec<u8> {
        let mut writer = HeaderWriter::new(AsfFile {
            packet_size: 3200,
            ..Default::default()
        });
        for &(number, kind, bitrate) in streams {
            writer = writer.stream(StreamSpec::new(number, kind).bitrate(bitrate));
        }
        writer.build_body()
    }

    fn number(header: &AsfHeader, index: Option<usize>) -> Option<u16> {
        index.and_then(|i| header.stream(i)).map(|s| s.stream_number)
    }

    #[test]
    fn test_picks_largest_fitting_audio() {
        let raw = header_bytes(&[(1, StreamType::Audio, 64_000), (2, StreamType::Audio, 128_000)]);
        let header = AsfHeader::parse(&raw).unwrap();
        let sel = choose_streams(&header, 100_000);
        assert_eq!(number(&header, sel.audio), Some(1));
        assert_eq!(sel.video, None);
    }

    #[test]
    fn test_zero_bandwidth_picks_lowest() {
        let raw = header_bytes(&[
            (1, StreamType::Video, 500_000),
            (2, StreamType::Video, 200_000),
            (3, StreamType::Audio, 96_000),
            (4, StreamType::Audio, 32_000),
        ]);
        let header = AsfHeader::parse(&raw).unwrap();
        let sel = choose_streams(&header, 0);
        assert_eq!(number(&header, sel.video), Some(2));
        assert_eq!(number(&header, sel.audio), Some(4));
    }

    #[test]
    fn test_video_bitrate_reduces_audio_budget() {
        let raw = header_bytes(&[
            (1, StreamType::Video, 250_000),
            (2, StreamType::Audio, 64_000),
            (3, StreamType::Audio, 32_000),
        ]);
        let header = AsfHeader::parse(&raw).unwrap();
        let sel = choose_streams(&header, 300_000);
        assert_eq!(number(&header, sel.video), Some(1));
        assert_eq!(number(&header, sel.audio), Some(3));

        let roomy = choose_streams(&header, 400_000);
        assert_eq!(number(&header, roomy.audio), Some(2));
    }

    #[test]
    fn test_ties_keep_first_slot() {
        let raw = header_bytes(&[(5, StreamType::Audio, 48_000), (6, StreamType::Audio, 48_000)]);
        let header = AsfHeader::parse(&raw).unwrap();
        assert_eq!(number(&header, choose_streams(&header, 1_000_000).audio), Some(5));
        assert_eq!(number(&header, choose_streams(&header, 0).audio), Some(5));
    }

    #[test]
    fn test_selection_is_monotonic() {
        let raw = header_bytes(&[
            (1, StreamType::Video, 100_000),
            (2, StreamType::Video, 300_000),
            (3, StreamType::Audio, 20_000),
            (4, StreamType::Audio, 64_000),
        ]);
        let header = AsfHeader::parse(&raw).unwrap();
        let total = |sel: StreamSelection| {
            sel.video.map_or(0, |i| header.bitrate(i)) + sel.audio.map_or(0, |i| header.bitrate(i))
        };
        let mut last = 0;
        for bandwidth in (0..=500_000).step_by(10_000) {
            let sel = choose_streams(&header, bandwidth);
            assert_eq!(sel, choose_streams(&header, bandwidth));
            assert!(total(sel) >= last, "bandwidth {bandwidth}");
            last = total(sel);
        }
    }

    #[test]
    fn test_disable_streams_zeroes_unselected_bitrates() {
        let mut raw = header_bytes(&[
            (1, StreamType::Video, 300_000),
            (2, StreamType::Audio, 64_000),
            (3, StreamType::Audio, 128_000),
        ]);
        let header = AsfHeader::parse(&raw).unwrap();
        let sel = choose_streams(&header, 400_000);
        assert_eq!(number(&header, sel.audio), Some(2));

        disable_streams(&header, &mut raw, sel);
        let patched = AsfHeader::parse(&raw).unwrap();
        assert_eq!(patched.bitrate(header.index_of(1).unwrap()), 300_000);
        assert_eq!(patched.bitrate(header.index_of(2).unwrap()), 64_000);
        assert_eq!(patched.bitrate(header.index_of(3).unwrap()), 0);
    }

    #[test]
    fn test_disable_streams_on_full_header_object() {
        let mut writer = HeaderWriter::new(AsfFile::default());
        writer = writer
            .stream(StreamSpec::new(1, StreamType::Audio).bitrate(10))
            .stream(StreamSpec::new(2, StreamType::Audio).bitrate(20));
        let mut full = writer.build();
        let header = AsfHeader::parse(&full[HEADER_OBJECT_PREFIX..]).unwrap();
        let sel = StreamSelection {
            video: None,
            audio: header.index_of(2),
        };
        disable_streams(&header, &mut full[HEADER_OBJECT_PREFIX..], sel);
        let patched = AsfHeader::parse(&full[HEADER_OBJECT_PREFIX..]).unwrap();
        assert_eq!(patched.bitrate(0), 0);
        assert_eq!(patched.bitrate(1), 20);
    }
}
