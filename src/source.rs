//! Opening a local file or a streaming location as one byte source.

use anyhow::{Context, Result};
use std::path::Path;

use asfstream_common::{FileInput, InputSource};
use asfstream_net::{MmsInput, MmsUrl};

use crate::config::Config;

/// Whether `location` names a network stream rather than a path.
pub fn is_network(location: &str) -> bool {
    MmsUrl::is_stream_location(location)
}

/// Open `location` for reading.
///
/// `mms://`, `mmst://` and `mmsh://` locations connect to a streaming
/// server; anything else is read as a file.
pub fn open_source(location: &str, config: &Config) -> Result<Box<dyn InputSource>> {
    if is_network(location) {
        tracing::info!(%location, protocol = %config.network.protocol, "opening stream");
        let input = MmsInput::open(location, &config.session_config())
            .with_context(|| format!("Failed to open stream: {location}"))?;
        return Ok(Box::new(input));
    }

    let path = Path::new(location);
    if !path.exists() {
        anyhow::bail!("File does not exist: {:?}", path);
    }
    let input = FileInput::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    tracing::debug!(?path, length = input.length(), "opened file");
    Ok(Box::new(input))
}
