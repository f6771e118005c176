//! Benchmark header parsing and packet demultiplexing over synthetic files.

use std::io::Cursor;

use asfstream_common::FileInput;
use asfstream_media::format::{BitmapInfoHeader, VideoInfo, WaveFormatEx};
use asfstream_media::header::AsfFile;
use asfstream_media::{
    AsfDemuxer, AsfFileBuilder, AsfHeader, DemuxConfig, DemuxEvent, DemuxSink, HeaderWriter, StreamSpec,
    StreamType,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

#[derive(Default)]
struct ByteCounter(usize);

impl DemuxSink for ByteCounter {
    fn deliver(&mut self, event: DemuxEvent) {
        if let DemuxEvent::Frame(frame) = event {
            self.0 += frame.data.len();
        }
    }
}

fn header(packet_size: u32) -> HeaderWriter {
    let bmih = BitmapInfoHeader::new(640, 480, *b"WMV3");
    HeaderWriter::new(AsfFile {
        packet_size,
        preroll: 3_000,
        max_bitrate: 1_000_000,
        seekable: true,
        ..Default::default()
    })
    .stream(
        StreamSpec::new(1, StreamType::Video)
            .private_data(VideoInfo::encode(640, 480, &bmih, &[]))
            .bitrate(900_000),
    )
    .stream(
        StreamSpec::new(2, StreamType::Audio)
            .private_data(WaveFormatEx::default().to_bytes())
            .bitrate(64_000),
    )
}

/// `seconds` of 25 fps video with 4 KiB frames and 10 audio objects per second.
fn make_file(seconds: u32) -> Vec<u8> {
    let mut builder = AsfFileBuilder::new(header(3_200));
    for i in 0..seconds * 25 {
        builder = builder.frame(1, i * 40, i % 25 == 0, vec![(i % 251) as u8; 4_096]);
        if i % 5 == 0 {
            builder = builder.frame(2, i * 40, false, vec![0xA5; 1_487]);
        }
    }
    builder.build().expect("synthetic file")
}

fn bench_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("demux");

    for seconds in [10u32, 60] {
        let file = make_file(seconds);
        group.throughput(Throughput::Bytes(file.len() as u64));
        group.bench_function(format!("{seconds}s_av"), |b| {
            b.iter(|| {
                let input = FileInput::new(Cursor::new(black_box(file.clone()))).unwrap();
                let mut demux = AsfDemuxer::new(input, DemuxConfig::default());
                let mut sink = ByteCounter::default();
                demux.start(&mut sink).unwrap();
                demux.run(&mut sink, None);
                sink.0
            });
        });
    }

    group.finish();
}

fn bench_header(c: &mut Criterion) {
    let body = header(3_200).build_body();
    c.bench_function("header_parse", |b| {
        b.iter(|| AsfHeader::parse(black_box(&body)).unwrap());
    });
}

criterion_group!(benches, bench_demux, bench_header);
criterion_main!(benches);
