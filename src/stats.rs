//! Counting demuxer output.

use std::collections::BTreeMap;

use serde::Serialize;

use asfstream_common::InputSource;
use asfstream_media::demux::{MediaKind, StreamInfo};
use asfstream_media::{AsfDemuxer, DemuxConfig, DemuxEvent, DemuxMode, DemuxSink, SeekTarget};

/// Per stream counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub kind: String,
    pub description: String,
    /// Media objects completed (chunks with `frame_end`).
    pub frames: u64,
    pub chunks: u64,
    pub bytes: u64,
    pub keyframes: u64,
    pub first_pts: Option<i64>,
    pub last_pts: Option<i64>,
}

/// Totals for one demuxer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemuxStats {
    pub packets: u64,
    pub streams: BTreeMap<u16, StreamStats>,
    pub audio_resets: u64,
    pub video_resets: u64,
    pub discontinuities: u64,
    pub headers: u64,
    #[serde(skip)]
    pub mode: Option<DemuxMode>,
}

fn kind_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
    }
}

impl DemuxSink for DemuxStats {
    fn deliver(&mut self, event: DemuxEvent) {
        match event {
            DemuxEvent::Start => self.headers += 1,
            DemuxEvent::StreamHeader(header) => {
                let description = match &header.info {
                    StreamInfo::Audio(wf) => format!(
                        "format 0x{:04x}, {} ch, {} Hz",
                        wf.format_tag, wf.channels, wf.samples_per_sec
                    ),
                    StreamInfo::Video {
                        width, height, fourcc, ..
                    } => format!("{fourcc} {width}x{height}"),
                };
                let entry = self.streams.entry(header.stream_number).or_default();
                entry.kind = kind_name(header.kind).to_string();
                entry.description = description;
            }
            DemuxEvent::Frame(frame) => {
                let entry = self.streams.entry(frame.stream_number).or_insert_with(|| StreamStats {
                    kind: kind_name(frame.kind).to_string(),
                    ..Default::default()
                });
                entry.chunks += 1;
                entry.bytes += frame.data.len() as u64;
                if frame.frame_end {
                    entry.frames += 1;
                }
                if frame.frame_start && frame.keyframe {
                    entry.keyframes += 1;
                }
                if frame.pts != 0 {
                    entry.first_pts.get_or_insert(frame.pts);
                    entry.last_pts = Some(frame.pts);
                }
            }
            DemuxEvent::ResetDecoder(MediaKind::Audio) => self.audio_resets += 1,
            DemuxEvent::ResetDecoder(MediaKind::Video) => self.video_resets += 1,
            DemuxEvent::NewPts { .. } => self.discontinuities += 1,
            DemuxEvent::End => {}
        }
    }
}

/// Demultiplex `input` and count what comes out.
pub fn demux_source<I: InputSource>(
    input: I,
    config: DemuxConfig,
    seek_ms: Option<u64>,
    max_packets: Option<u64>,
) -> anyhow::Result<DemuxStats> {
    let mut demuxer = AsfDemuxer::new(input, config);
    let mut stats = DemuxStats::default();
    demuxer.start(&mut stats)?;

    if let Some(ms) = seek_ms {
        tracing::info!(ms, "seeking");
        demuxer.seek(SeekTarget::Time(ms), false, &mut stats);
    }

    stats.packets = demuxer.run(&mut stats, max_packets);
    stats.mode = Some(demuxer.mode());
    tracing::info!(packets = stats.packets, streams = stats.streams.len(), "demux finished");
    Ok(stats)
}
