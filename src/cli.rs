use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "asfstream")]
#[command(author, version, about = "ASF/WMV file and MMS stream inspection tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe an ASF file or stream and display its header
    Probe {
        /// File path or mms://, mmst://, mmsh:// location
        #[arg(required = true)]
        source: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Bandwidth in bits/s used for stream selection
        #[arg(long)]
        bandwidth: Option<u32>,
    },

    /// Copy the byte stream a source serves into a file
    Dump {
        /// File path or mms://, mmst://, mmsh:// location
        #[arg(required = true)]
        source: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Stop after this many bytes
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Demultiplex a source and print per-stream statistics
    Demux {
        /// File path or mms://, mmst://, mmsh:// location
        #[arg(required = true)]
        source: String,

        /// Seek to this time before reading packets
        #[arg(long)]
        seek_ms: Option<u64>,

        /// Stop after this many data packets
        #[arg(long)]
        max_packets: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// List the bandwidth presets
    Presets,
}
