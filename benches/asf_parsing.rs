//! Benchmarks for the probe path: header parsing, stream selection and
//! report building, plus location and config parsing.

use std::io::Cursor;

use asfstream::config::Config;
use asfstream::probe::probe_source;
use asfstream_common::FileInput;
use asfstream_media::format::{BitmapInfoHeader, VideoInfo, WaveFormatEx};
use asfstream_media::header::{AsfContent, AsfFile};
use asfstream_media::{choose_streams, AsfHeader, DemuxConfig, HeaderWriter, StreamSpec, StreamType};
use asfstream_net::MmsUrl;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A multi-bitrate header: three video and three audio streams.
fn header_bytes() -> Vec<u8> {
    let mut writer = HeaderWriter::new(AsfFile {
        packet_size: 3_200,
        preroll: 5_000,
        send_duration: 600_050_000,
        max_bitrate: 2_000_000,
        seekable: true,
        ..Default::default()
    })
    .content(AsfContent {
        title: Some("Benchmark".into()),
        author: Some("asfstream".into()),
        description: Some("Several renditions of the same program".into()),
        ..Default::default()
    });

    for (i, (w, h, rate)) in [(320, 240, 300_000), (640, 480, 800_000), (1280, 720, 1_500_000)]
        .into_iter()
        .enumerate()
    {
        let bmih = BitmapInfoHeader::new(w, h, *b"WMV3");
        writer = writer.stream(
            StreamSpec::new(i as u16 + 1, StreamType::Video)
                .private_data(VideoInfo::encode(w as u32, h as u32, &bmih, &[]))
                .bitrate(rate)
                .aspect_ratio(1, 1),
        );
    }
    for (i, rate) in [32_000, 64_000, 128_000].into_iter().enumerate() {
        writer = writer.stream(
            StreamSpec::new(i as u16 + 4, StreamType::Audio)
                .private_data(WaveFormatEx::default().to_bytes())
                .bitrate(rate),
        );
    }

    let mut bytes = writer.build();
    bytes.extend_from_slice(&asfstream_media::writer::data_object_header(Default::default(), 0, 3_200));
    bytes
}

fn bench_header(c: &mut Criterion) {
    let bytes = header_bytes();
    let mut group = c.benchmark_group("header");

    group.bench_function("parse", |b| {
        b.iter(|| AsfHeader::parse(black_box(&bytes[24..])).unwrap())
    });

    let header = AsfHeader::parse(&bytes[24..]).unwrap();
    group.bench_function("choose_streams", |b| {
        b.iter(|| choose_streams(black_box(&header), black_box(1_000_000)))
    });

    group.bench_function("probe_report", |b| {
        b.iter(|| {
            let input = FileInput::new(Cursor::new(bytes.clone())).unwrap();
            probe_source("bench.asf", input, DemuxConfig::default(), 1_000_000).unwrap()
        })
    });

    group.finish();
}

fn bench_locations(c: &mut Criterion) {
    let mut group = c.benchmark_group("location");

    group.bench_function("mms_url", |b| {
        b.iter(|| MmsUrl::parse(black_box("mms://media.example.com:1755/live/news%20feed.asf?id=7")).unwrap())
    });

    let toml = r#"
[network]
bandwidth_preset = "dsl524k"
protocol = "http"
connect_timeout_ms = 5000

[demux]
max_chunk_size = 4096
text_codec = "ascii"
"#;
    group.bench_function("config", |b| {
        b.iter(|| toml::from_str::<Config>(black_box(toml)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_header, bench_locations);
criterion_main!(benches);
