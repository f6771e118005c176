//! Shared fixtures for the loopback session tests.
//!
//! Streams are synthesized with the media crate's writer and served by
//! scripted servers running on a thread bound to `127.0.0.1`.

#![allow(dead_code)]

use std::net::TcpListener;
use std::time::Duration;

use uuid::Uuid;

use asfstream_common::Protocol;
use asfstream_media::format::WaveFormatEx;
use asfstream_media::header::AsfFile;
use asfstream_media::writer::DATA_OBJECT_HEADER_SIZE;
use asfstream_media::{AsfFileBuilder, HeaderWriter, StreamSpec, StreamType};
use asfstream_net::{SessionConfig, TransportConfig};

pub const PACKET_SIZE: usize = 256;
/// Enough for the 32 kbit/s stream but not the 64 kbit/s one.
pub const BANDWIDTH: u32 = 40_000;

/// Header Object plus Data Object header, and the data packets after it.
pub struct SampleStream {
    pub header: Vec<u8>,
    pub packets: Vec<Vec<u8>>,
}

impl SampleStream {
    /// Two audio streams (1 at 32 kbit/s, 2 at 64 kbit/s) and `frames`
    /// objects on stream 1 whose bytes start at `marker`.
    pub fn new(frames: u8, marker: u8) -> Self {
        let header = HeaderWriter::new(AsfFile {
            packet_size: PACKET_SIZE as u32,
            max_bitrate: 96_000,
            seekable: true,
            ..Default::default()
        })
        .stream(
            StreamSpec::new(1, StreamType::Audio)
                .private_data(WaveFormatEx::default().to_bytes())
                .bitrate(32_000),
        )
        .stream(
            StreamSpec::new(2, StreamType::Audio)
                .private_data(WaveFormatEx::default().to_bytes())
                .bitrate(64_000),
        );

        let mut builder = AsfFileBuilder::new(header);
        for i in 0..frames {
            let fill = marker.wrapping_add(i).max(1);
            builder = builder.frame(1, u32::from(i) * 100, false, vec![fill; 100]);
        }
        let file = builder.build().expect("synthetic stream");

        let object_len = u64::from_le_bytes(file[16..24].try_into().unwrap()) as usize;
        let header_len = object_len + DATA_OBJECT_HEADER_SIZE;
        Self {
            header: file[..header_len].to_vec(),
            packets: file[header_len..].chunks(PACKET_SIZE).map(<[u8]>::to_vec).collect(),
        }
    }

    /// Everything a client should serve for this stream.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.header.clone();
        for packet in &self.packets {
            out.extend_from_slice(packet);
        }
        out
    }
}

/// A packet without its trailing zero padding, as servers send it.
pub fn trimmed(packet: &[u8]) -> &[u8] {
    let end = packet.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &packet[..end]
}

pub fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

pub fn config(protocol: Protocol) -> SessionConfig {
    SessionConfig {
        bandwidth: BANDWIDTH,
        protocol,
        transport: TransportConfig {
            connect_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            read_timeout: Some(Duration::from_secs(5)),
        },
        client_guid: Some(Uuid::from_u128(0x3300AD50_2C39_46C0_AE0A_70D0A5E0C3B1)),
        text_codec: Default::default(),
    }
}

/// Read from `read` until it returns 0.
pub fn drain(mut read: impl FnMut(&mut [u8]) -> asfstream_common::Result<usize>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = read(&mut buf).expect("session read");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}
