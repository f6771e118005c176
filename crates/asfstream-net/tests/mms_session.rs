//! MMS over TCP against a scripted loopback server.

mod common;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use assert_matches::assert_matches;

use asfstream_common::text::encode_utf16le;
use asfstream_common::{Error, InputSource, Protocol};
use asfstream_net::mms::command::{
    encode_media_packet, id, Command, DATA_PACKET_TYPE, HEADER_PACKET_TYPE, TO_CLIENT,
};
use asfstream_net::MmsInput;

use common::{config, drain, listen, trimmed, SampleStream};

/// What the server saw from the client.
#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<Command>,
}

impl Transcript {
    fn find(&self, command: u16) -> Vec<&Command> {
        self.commands.iter().filter(|c| c.command == command).collect()
    }
}

struct Server {
    sock: TcpStream,
    seq: u32,
    transcript: Transcript,
}

impl Server {
    fn accept(listener: &TcpListener) -> Self {
        let (sock, _) = listener.accept().unwrap();
        Self {
            sock,
            seq: 0,
            transcript: Transcript::default(),
        }
    }

    fn expect(&mut self, command: u16) -> Command {
        let mut head = [0u8; 12];
        self.sock.read_exact(&mut head).unwrap();
        let len = u32::from_le_bytes(head[8..12].try_into().unwrap()) as usize + 4;
        let mut frame = head.to_vec();
        frame.resize(12 + len, 0);
        self.sock.read_exact(&mut frame[12..]).unwrap();
        let cmd = Command::decode(&frame).unwrap();
        assert_eq!(cmd.command, command, "client sent 0x{:02x}", cmd.command);
        self.transcript.commands.push(cmd.clone());
        cmd
    }

    fn reply(&mut self, command: u16, prefix1: u32, body: Vec<u8>) {
        let frame = Command::new(command, prefix1, 0, body)
            .direction(TO_CLIENT)
            .seq(self.seq)
            .encode();
        self.seq += 1;
        self.sock.write_all(&frame).unwrap();
    }

    fn send_header(&mut self, header: &[u8]) {
        let half = header.len() / 2;
        self.sock
            .write_all(&encode_media_packet(0, HEADER_PACKET_TYPE, 0x04, &header[..half]))
            .unwrap();
        self.sock
            .write_all(&encode_media_packet(1, HEADER_PACKET_TYPE, 0x08, &header[half..]))
            .unwrap();
    }

    fn send_packets(&mut self, stream: &SampleStream) {
        for (seq, packet) in stream.packets.iter().enumerate() {
            self.sock
                .write_all(&encode_media_packet(seq as u32, DATA_PACKET_TYPE, 0, trimmed(packet)))
                .unwrap();
        }
    }

    /// Handshake up to and including the header and stream selection.
    fn handshake(&mut self, stream: &SampleStream) {
        self.expect(id::CONNECT_INFO);
        self.reply(id::CONNECT_INFO, 0, vec![0; 32]);
        self.expect(id::TRANSPORT);
        self.reply(id::TRANSPORT, 0, Vec::new());
        self.expect(id::REQUEST_FILE);
        self.reply(id::FILE_INFO, 0, vec![0; 64]);
        self.expect(id::REQUEST_HEADER);
        self.reply(id::HEADER_INFO, 0, vec![0; 16]);
        self.send_header(&stream.header);
        self.expect(id::SELECT_STREAMS);
        self.reply(id::STREAM_SELECTED, 0, Vec::new());
    }
}

fn spawn(script: impl FnOnce(&TcpListener) -> Transcript + Send + 'static) -> (u16, JoinHandle<Transcript>) {
    let (listener, port) = listen();
    let handle = thread::spawn(move || script(&listener));
    (port, handle)
}

fn start_time(cmd: &Command) -> f64 {
    f64::from_le_bytes(cmd.body[..8].try_into().unwrap())
}

#[test]
fn test_session_serves_header_then_padded_packets() {
    let stream = SampleStream::new(6, 0x40);
    let expected = stream.bytes();
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&stream);
        server.expect(id::START_PLAY);
        server.send_packets(&stream);
        server.reply(id::END_OF_STREAM, 0, Vec::new());
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/media/clip%201.asf"), &config(Protocol::Auto)).unwrap();
    assert_eq!(input.protocol(), Protocol::Tcp);
    assert_eq!(input.length(), expected.len() as u64);

    let mut peek = vec![0u8; 64];
    assert_eq!(input.preview(&mut peek).unwrap(), 64);
    assert_eq!(&peek[..], &expected[..64]);

    let got = drain(|buf| input.read(buf));
    assert_eq!(got.len(), expected.len());
    assert!(got == expected, "served bytes differ from the stream");
    assert_eq!(input.position(), expected.len() as u64);

    let transcript = server.join().unwrap();
    let connect = transcript.find(id::CONNECT_INFO)[0];
    assert_eq!(connect.prefix2, 0x0004_000B);
    let info = String::from_utf16_lossy(
        &connect
            .body
            .chunks_exact(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect::<Vec<_>>(),
    );
    assert!(info.contains("NSPlayer/7.0.0.1956; {3300AD50-2C39-46C0-AE0A-70D0A5E0C3B1}; Host: 127.0.0.1"));

    let request = transcript.find(id::REQUEST_FILE)[0];
    let path = encode_utf16le("media/clip 1.asf");
    assert_eq!(&request.body[8..8 + path.len()], &path[..]);
    assert_eq!(request.prefix1, 1);
    assert_eq!(request.prefix2, 0xFFFF_FFFF);
}

#[test]
fn test_stream_selection_command() {
    let stream = SampleStream::new(1, 0x10);
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&stream);
        server.transcript
    });

    let input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto)).unwrap();
    drop(input);

    let transcript = server.join().unwrap();
    let select = transcript.find(id::SELECT_STREAMS)[0];
    assert_eq!(select.prefix1, 2);
    assert_eq!(select.prefix2, 0x0001_FFFF);
    // stream 2 exceeds the bandwidth and is switched off
    assert_eq!(&select.body[..8], &[0x00, 0x00, 0xFF, 0xFF, 0x02, 0x00, 0x02, 0x00]);
}

#[test]
fn test_time_seek_sets_start_play_time() {
    let stream = SampleStream::new(2, 0x20);
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&stream);
        server.expect(id::START_PLAY);
        server.send_packets(&stream);
        server.reply(id::END_OF_STREAM, 0, Vec::new());
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto)).unwrap();
    input.seek_time(12_500).unwrap();
    drain(|buf| input.read(buf));

    let transcript = server.join().unwrap();
    let play = transcript.find(id::START_PLAY)[0];
    assert_eq!(start_time(play), 12.5);
    assert_eq!(play.prefix1, 1);
    assert_eq!(play.prefix2, 0x0001_FFFF);
    assert_eq!(play.body[20], 0x04);
}

#[test]
fn test_keepalive_is_echoed() {
    let stream = SampleStream::new(3, 0x30);
    let expected = stream.bytes();
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&stream);
        server.expect(id::START_PLAY);
        server.reply(id::KEEPALIVE, 0, Vec::new());
        server.expect(id::KEEPALIVE);
        server.send_packets(&stream);
        server.reply(id::END_OF_STREAM, 0, Vec::new());
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto)).unwrap();
    let got = drain(|buf| input.read(buf));
    assert!(got == expected);
    assert_eq!(server.join().unwrap().find(id::KEEPALIVE).len(), 1);
}

#[test]
fn test_new_stream_replays_header() {
    let first = SampleStream::new(3, 0x50);
    let second = SampleStream::new(2, 0x90);
    let mut expected = first.bytes();
    expected.extend_from_slice(&second.bytes());

    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&first);
        server.expect(id::START_PLAY);
        server.send_packets(&first);
        server.reply(id::END_OF_STREAM, 1, Vec::new());
        server.reply(id::NEW_STREAM, 0, Vec::new());
        server.send_header(&second.header);
        server.expect(id::SELECT_STREAMS);
        server.reply(id::STREAM_SELECTED, 0, Vec::new());
        server.expect(id::START_PLAY);
        server.send_packets(&second);
        server.reply(id::END_OF_STREAM, 0, Vec::new());
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto)).unwrap();
    let got = drain(|buf| input.read(buf));
    assert_eq!(got.len(), expected.len());
    assert!(got == expected);

    let transcript = server.join().unwrap();
    let plays = transcript.find(id::START_PLAY);
    assert_eq!(plays.len(), 2);
    assert_eq!(start_time(plays[1]), 0.0);
}

#[test]
fn test_transport_refusal_is_protocol_violation() {
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.expect(id::CONNECT_INFO);
        server.reply(id::CONNECT_INFO, 0, Vec::new());
        server.expect(id::TRANSPORT);
        server.reply(id::TRANSPORT_FAILED, 0, Vec::new());
        server.transcript
    });

    let err = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto))
        .err()
        .unwrap();
    assert_matches!(err, Error::ProtocolViolation(_));
    server.join().unwrap();
}

#[test]
fn test_authentication_is_unsupported() {
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.expect(id::CONNECT_INFO);
        server.reply(id::CONNECT_INFO, 0, Vec::new());
        server.expect(id::TRANSPORT);
        server.reply(id::TRANSPORT, 0, Vec::new());
        server.expect(id::REQUEST_FILE);
        server.reply(id::AUTH_REQUIRED, 0, Vec::new());
        server.transcript
    });

    let err = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto))
        .err()
        .unwrap();
    assert_matches!(err, Error::Unsupported(_));
    server.join().unwrap();
}

#[test]
fn test_oversized_packet_fails_read() {
    let stream = SampleStream::new(1, 0x60);
    let header_len = stream.header.len();
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.handshake(&stream);
        server.expect(id::START_PLAY);
        server
            .sock
            .write_all(&encode_media_packet(0, DATA_PACKET_TYPE, 0, &[1u8; common::PACKET_SIZE + 1]))
            .unwrap();
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/a.asf"), &config(Protocol::Auto)).unwrap();
    let mut header = vec![0u8; header_len];
    assert_eq!(input.read(&mut header).unwrap(), header_len);
    let mut buf = [0u8; 512];
    assert_matches!(input.read(&mut buf), Err(Error::ProtocolViolation(_)));
    assert_eq!(input.read(&mut buf).unwrap(), 0);
    server.join().unwrap();
}

#[test]
fn test_stray_media_packet_during_handshake_is_skipped() {
    let stream = SampleStream::new(2, 0x50);
    let expected = stream.bytes();
    let (port, server) = spawn(move |listener| {
        let mut server = Server::accept(listener);
        server.expect(id::CONNECT_INFO);
        server
            .sock
            .write_all(&encode_media_packet(0, DATA_PACKET_TYPE, 0, &[0xEE; 16]))
            .unwrap();
        server.reply(id::CONNECT_INFO, 0, vec![0; 32]);
        server.expect(id::TRANSPORT);
        server.reply(id::TRANSPORT, 0, Vec::new());
        server.expect(id::REQUEST_FILE);
        server.reply(id::FILE_INFO, 0, vec![0; 64]);
        server.expect(id::REQUEST_HEADER);
        server.reply(id::HEADER_INFO, 0, vec![0; 16]);
        server.send_header(&stream.header);
        server.expect(id::SELECT_STREAMS);
        server.reply(id::STREAM_SELECTED, 0, Vec::new());
        server.expect(id::START_PLAY);
        server.send_packets(&stream);
        server.reply(id::END_OF_STREAM, 0, Vec::new());
        server.transcript
    });

    let mut input = MmsInput::open(&format!("mmst://127.0.0.1:{port}/clip.asf"), &config(Protocol::Tcp)).unwrap();
    let got = drain(|buf| input.read(buf));
    assert!(got == expected, "served bytes differ from the stream");
    server.join().unwrap();
}
