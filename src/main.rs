mod cli;

use asfstream::{config, probe, source, stats};
use asfstream_common::{BandwidthPreset, InputSource};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "asfstream=trace,asfstream_net=trace,asfstream_media=trace,asfstream_common=debug".to_string()
        } else {
            "asfstream=info,asfstream_net=info,asfstream_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe {
            source,
            json,
            bandwidth,
        } => probe_source(&source, cli.config.as_deref(), json, bandwidth),
        Commands::Dump {
            source,
            output,
            limit,
        } => dump_source(&source, cli.config.as_deref(), &output, limit),
        Commands::Demux {
            source,
            seek_ms,
            max_packets,
            json,
        } => demux_source(&source, cli.config.as_deref(), seek_ms, max_packets, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Presets => {
            for (i, preset) in BandwidthPreset::ALL.iter().enumerate() {
                let marker = if *preset == BandwidthPreset::default() { " (default)" } else { "" };
                println!("{:2}  {:>9}  {}{}", i, preset.bits_per_second(), preset.label(), marker);
            }
            Ok(())
        }
    }
}

fn probe_source(location: &str, config_path: Option<&Path>, json: bool, bandwidth: Option<u32>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let bandwidth = bandwidth.unwrap_or_else(|| config.network.bandwidth());

    let input = source::open_source(location, &config)?;
    let report = probe::probe_source(location, input, config.demux_config(), bandwidth)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Source: {}", report.source);
    if report.length > 0 {
        println!("Size: {} bytes", report.length);
    }
    println!("Duration: {}", probe::format_duration(report.length_ms));
    println!(
        "Packets: {} x {} bytes, preroll {} ms",
        report.packet_count, report.packet_size, report.preroll_ms
    );
    println!("Max bitrate: {} bit/s", report.max_bitrate);
    println!(
        "Flags: {}{}",
        if report.seekable { "seekable" } else { "not seekable" },
        if report.broadcast { ", broadcast" } else { "" }
    );
    if report.encrypted {
        println!("Encrypted: yes (payloads will not be delivered)");
    }

    let content = &report.content;
    for (label, value) in [
        ("Title", &content.title),
        ("Author", &content.author),
        ("Copyright", &content.copyright),
        ("Description", &content.description),
        ("Rating", &content.rating),
    ] {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }

    println!("\nStreams: {}", report.streams.len());
    for stream in &report.streams {
        print!("  [{}] {} {} bit/s", stream.number, stream.kind, stream.bitrate);
        if let Some(ref video) = stream.video {
            print!(", {} {}x{}", video.fourcc, video.width, video.height);
        }
        if let Some(ref audio) = stream.audio {
            print!(
                ", format 0x{:04x} {} ch {} Hz",
                audio.format_tag, audio.channels, audio.sample_rate
            );
        }
        if let Some((x, y)) = stream.aspect_ratio {
            print!(", aspect {}:{}", x, y);
        }
        if stream.encrypted {
            print!(" [encrypted]");
        }
        if report.selected.contains(&stream.number) {
            print!(" [selected]");
        }
        println!();
    }
    println!("\nSelection at {} bit/s: {:?}", report.bandwidth, report.selected);

    Ok(())
}

fn dump_source(location: &str, config_path: Option<&Path>, output: &Path, limit: Option<u64>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let mut input = source::open_source(location, &config)?;

    let file = File::create(output).with_context(|| format!("Failed to create output file: {:?}", output))?;
    let mut writer = BufWriter::new(file);

    let limit = limit.unwrap_or(u64::MAX);
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    while written < limit {
        let want = (limit - written).min(buf.len() as u64) as usize;
        let n = input
            .read(&mut buf[..want])
            .with_context(|| format!("Read failed after {written} bytes"))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        written += n as u64;
    }
    writer.flush()?;

    tracing::info!(written, ?output, "dump complete");
    println!("Wrote {} bytes to {}", written, output.display());
    Ok(())
}

fn demux_source(
    location: &str,
    config_path: Option<&Path>,
    seek_ms: Option<u64>,
    max_packets: Option<u64>,
    json: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let input = source::open_source(location, &config)?;
    let stats = stats::demux_source(input, config.demux_config(), seek_ms, max_packets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Packets: {}", stats.packets);
    if let Some(mode) = stats.mode {
        if mode != asfstream_media::DemuxMode::Normal {
            println!("Mode: {:?}", mode);
        }
    }
    for (number, stream) in &stats.streams {
        println!(
            "  [{}] {} {}: {} frames, {} bytes, {} keyframes",
            number, stream.kind, stream.description, stream.frames, stream.bytes, stream.keyframes
        );
        if let (Some(first), Some(last)) = (stream.first_pts, stream.last_pts) {
            println!("      pts {} .. {}", first, last);
        }
    }
    println!(
        "Decoder resets: audio {}, video {}",
        stats.audio_resets, stats.video_resets
    );
    println!("Discontinuities: {}", stats.discontinuities);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    let network = &config.network;
    println!("  Bandwidth: {} bit/s", network.bandwidth());
    println!("  Protocol: {}", network.protocol);
    println!(
        "  Connect timeout: {} ms (poll {} ms)",
        network.connect_timeout_ms, network.poll_interval_ms
    );
    println!("  Read timeout: {} ms", network.read_timeout_ms);
    println!("  Max chunk size: {} bytes", config.demux.max_chunk_size);
    println!("  Text codec: {:?}", config.demux.text_codec);
}
