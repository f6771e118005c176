//! Summaries of an ASF header for display.

use serde::Serialize;

use asfstream_common::InputSource;
use asfstream_media::format::{VideoInfo, WaveFormatEx};
use asfstream_media::header::{AsfContent, AsfHeader};
use asfstream_media::{choose_streams, AsfDemuxer, DemuxConfig, DemuxEvent, DemuxMode, StreamType};

/// Everything `probe` reports about a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub source: String,
    /// Bytes, 0 when the source does not know.
    pub length: u64,
    pub seekable: bool,
    pub broadcast: bool,
    pub packet_size: u32,
    pub packet_count: u64,
    pub max_bitrate: u32,
    pub preroll_ms: u64,
    pub length_ms: u64,
    pub encrypted: bool,
    pub content: AsfContent,
    pub streams: Vec<StreamReport>,
    /// Bandwidth the selection below was made for.
    pub bandwidth: u32,
    pub selected: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamReport {
    pub number: u16,
    pub kind: String,
    pub bitrate: u32,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioReport>,
    /// Pixel aspect ratio from the metadata, when both values are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoReport {
    pub width: u32,
    pub height: u32,
    pub fourcc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioReport {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl ProbeReport {
    /// Build a report from a parsed header.
    pub fn from_header(source: &str, length: u64, header: &AsfHeader, bandwidth: u32) -> Self {
        let selection = choose_streams(header, bandwidth);

        let streams: Vec<StreamReport> = header
            .streams()
            .map(|(index, stream)| {
                let aspect = header.aspect_ratio(index);
                let (video, audio) = match stream.stream_type {
                    StreamType::Video => (
                        VideoInfo::parse(&stream.private_data).ok().map(|info| VideoReport {
                            width: info.width,
                            height: info.height,
                            fourcc: info.bitmap.compression.to_string(),
                        }),
                        None,
                    ),
                    StreamType::Audio => (
                        None,
                        WaveFormatEx::parse(&stream.private_data).ok().map(|wf| AudioReport {
                            format_tag: wf.format_tag,
                            channels: wf.channels,
                            sample_rate: wf.samples_per_sec,
                            bits_per_sample: wf.bits_per_sample,
                        }),
                    ),
                    _ => (None, None),
                };
                StreamReport {
                    number: stream.stream_number,
                    kind: stream.stream_type.to_string(),
                    bitrate: header.bitrate(index),
                    encrypted: stream.encrypted,
                    video,
                    audio,
                    aspect_ratio: aspect.is_set().then_some((aspect.x, aspect.y)),
                }
            })
            .collect();

        let selected = [selection.video, selection.audio]
            .into_iter()
            .flatten()
            .filter_map(|index| header.stream(index).map(|s| s.stream_number))
            .collect();

        Self {
            source: source.to_string(),
            length,
            seekable: header.file.seekable,
            broadcast: header.file.broadcast,
            packet_size: header.file.packet_size,
            packet_count: header.file.data_packet_count,
            max_bitrate: header.file.max_bitrate,
            preroll_ms: header.file.preroll,
            length_ms: header.length_ms(),
            encrypted: streams.iter().any(|s| s.encrypted),
            content: header.content.clone(),
            streams,
            bandwidth,
            selected,
        }
    }
}

/// Read the header from `input` and summarize it.
pub fn probe_source<I: InputSource>(
    source: &str,
    input: I,
    demux: DemuxConfig,
    bandwidth: u32,
) -> anyhow::Result<ProbeReport> {
    let mut demuxer = AsfDemuxer::new(input, demux);
    let mut events: Vec<DemuxEvent> = Vec::new();
    demuxer.start(&mut events)?;
    if demuxer.mode() == DemuxMode::NoContent {
        tracing::warn!(%source, "header references a stream without properties");
    }

    let length = demuxer.input().length();
    let header = demuxer
        .header()
        .ok_or_else(|| anyhow::anyhow!("No ASF header in {source}"))?;
    Ok(ProbeReport::from_header(source, length, header, bandwidth))
}

/// Format milliseconds as `hh:mm:ss.mmm`.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}.{:03}", secs / 3600, secs / 60 % 60, secs % 60, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asfstream_common::FileInput;
    use asfstream_media::format::BitmapInfoHeader;
    use asfstream_media::header::AsfFile;
    use asfstream_media::{AsfFileBuilder, HeaderWriter, StreamSpec};
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        let bmih = BitmapInfoHeader::new(320, 240, *b"WMV2");
        let header = HeaderWriter::new(AsfFile {
            packet_size: 1_024,
            preroll: 2_000,
            send_duration: 50_002_000,
            max_bitrate: 400_000,
            seekable: true,
            ..Default::default()
        })
        .content(AsfContent {
            title: Some("Clip".into()),
            author: Some("Someone".into()),
            ..Default::default()
        })
        .stream(
            StreamSpec::new(1, StreamType::Video)
                .private_data(VideoInfo::encode(320, 240, &bmih, &[]))
                .bitrate(300_000)
                .aspect_ratio(4, 3),
        )
        .stream(
            StreamSpec::new(2, StreamType::Audio)
                .private_data(
                    WaveFormatEx {
                        format_tag: 0x161,
                        channels: 2,
                        samples_per_sec: 44_100,
                        avg_bytes_per_sec: 8_000,
                        block_align: 1_487,
                        bits_per_sample: 16,
                        extra: Vec::new(),
                    }
                    .to_bytes(),
                )
                .bitrate(64_000),
        )
        .stream(
            StreamSpec::new(3, StreamType::Audio)
                .private_data(WaveFormatEx::default().to_bytes())
                .bitrate(128_000),
        );
        AsfFileBuilder::new(header)
            .frame(1, 0, true, vec![1; 500])
            .build()
            .unwrap()
    }

    #[test]
    fn test_probe_report() {
        let input = FileInput::new(Cursor::new(sample())).unwrap();
        let report = probe_source("clip.asf", input, DemuxConfig::default(), 400_000).unwrap();

        assert_eq!(report.packet_size, 1_024);
        assert_eq!(report.length_ms, 5_000);
        assert_eq!(report.content.title.as_deref(), Some("Clip"));
        assert_eq!(report.streams.len(), 3);

        let video = &report.streams[0];
        assert_eq!(video.kind, "video");
        assert_eq!(video.aspect_ratio, Some((4, 3)));
        assert_eq!(
            video.video,
            Some(VideoReport {
                width: 320,
                height: 240,
                fourcc: "WMV2".into()
            })
        );
        let audio = report.streams[1].audio.as_ref().unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 44_100);

        // 300k video leaves 100k, which only the 64k audio fits
        assert_eq!(report.selected, vec![1, 2]);
        assert!(!report.encrypted);
    }

    #[test]
    fn test_probe_rejects_non_asf() {
        let input = FileInput::new(Cursor::new(vec![0u8; 256])).unwrap();
        assert!(probe_source("zeros", input, DemuxConfig::default(), 1).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00.000");
        assert_eq!(format_duration(3_723_004), "01:02:03.004");
    }
}
