//! `mms://`, `mmst://` and `mmsh://` locations.

use std::fmt;

use url::Url;

use asfstream_common::{Error, Result};

/// Default port of MMS over TCP.
pub const MMST_PORT: u16 = 1755;
/// Default port of MMS over HTTP.
pub const MMSH_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Either transport, chosen by configuration.
    Mms,
    /// MMS over TCP only.
    Mmst,
    /// MMS over HTTP only.
    Mmsh,
}

impl Scheme {
    fn from_str(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mms" => Some(Self::Mms),
            "mmst" => Some(Self::Mmst),
            "mmsh" => Some(Self::Mmsh),
            _ => None,
        }
    }
}

/// A parsed streaming location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmsUrl {
    pub scheme: Scheme,
    pub host: String,
    /// Port given in the location, if any.
    pub port: Option<u16>,
    /// Path and query as they appear on the wire, always starting with `/`.
    pub uri: String,
}

impl MmsUrl {
    pub fn parse(location: &str) -> Result<Self> {
        let url = Url::parse(location).map_err(|e| Error::invalid_url(format!("{location}: {e}")))?;
        let scheme = Scheme::from_str(url.scheme())
            .ok_or_else(|| Error::invalid_url(format!("{location}: unsupported scheme {}", url.scheme())))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::invalid_url(format!("{location}: missing host")))?
            .to_string();

        let mut uri = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };
        if let Some(query) = url.query() {
            uri.push('?');
            uri.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port: url.port(),
            uri,
        })
    }

    /// Whether `location` names one of the streaming schemes.
    pub fn is_stream_location(location: &str) -> bool {
        location
            .split_once("://")
            .is_some_and(|(scheme, _)| Scheme::from_str(scheme).is_some())
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// The request path with percent escapes decoded and the leading `/`
    /// removed, as MMS sends it in the file request.
    pub fn media_path(&self) -> String {
        let raw = self.uri.strip_prefix('/').unwrap_or(&self.uri);
        String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
    }
}

impl fmt::Display for MmsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Mms => "mms",
            Scheme::Mmst => "mmst",
            Scheme::Mmsh => "mmsh",
        };
        write!(f, "{scheme}://{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}", self.uri)
    }
}
