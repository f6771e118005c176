mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Locations searched when no config file is named, in order.
pub const DEFAULT_PATHS: [&str; 3] = [
    "./asfstream.toml",
    "~/.config/asfstream/config.toml",
    "/etc/asfstream/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    tracing::debug!(?path, "config loaded");

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let network = &config.network;

    if network.bandwidth() == 0 {
        anyhow::bail!("Bandwidth cannot be 0");
    }
    if network.poll_interval_ms == 0 {
        anyhow::bail!("Poll interval cannot be 0");
    }
    if network.poll_interval_ms > network.connect_timeout_ms {
        anyhow::bail!(
            "Poll interval ({} ms) is longer than the connect timeout ({} ms)",
            network.poll_interval_ms,
            network.connect_timeout_ms
        );
    }

    if config.demux.max_chunk_size == 0 {
        anyhow::bail!("Demux chunk size cannot be 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asfstream_common::{BandwidthPreset, Protocol, Utf16Codec};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.bandwidth(), 1_544_000);
        assert_eq!(config.network.protocol, Protocol::Auto);
        assert_eq!(config.demux.max_chunk_size, 8192);
        assert_eq!(config.demux.text_codec, Utf16Codec::Unicode);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
[network]
bandwidth_preset = "isdn"
protocol = "http"
read_timeout_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.network.bandwidth_preset, BandwidthPreset::Isdn);
        assert_eq!(config.network.bandwidth(), 115_200);
        assert_eq!(config.network.connect_timeout_ms, 15_000);
        assert_eq!(config.network.transport().read_timeout, None);
        assert_eq!(config.demux, DemuxSettings::default());
    }

    #[test]
    fn test_override_beats_preset() {
        let mut config = Config::default();
        config.network.bandwidth_preset = BandwidthPreset::Modem14k;
        config.network.bandwidth = Some(300_000);
        assert_eq!(config.session_config().bandwidth, 300_000);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.network.bandwidth = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.network.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.network.poll_interval_ms = 20_000;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.demux.max_chunk_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unknown_preset_is_parse_error() {
        assert!(toml::from_str::<Config>("[network]\nbandwidth_preset = \"carrier-pigeon\"\n").is_err());
    }
}
