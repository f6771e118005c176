//! MMSH request templates and response head parsing.

use asfstream_common::{Error, Result};

pub const USER_AGENT: &str = "NSPlayer/4.1.0.3856";
/// Client GUID sent when none is configured.
pub const DEFAULT_CLIENT_GUID: &str = "c77e7400-738a-11d2-9add-0020af0a3278";

/// How the server describes the stream in its `Pragma: features=` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Seekable,
    Live,
}

/// The common part of every request.
#[derive(Debug, Clone)]
pub struct RequestTarget<'a> {
    pub uri: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub client_guid: &'a str,
}

impl RequestTarget<'_> {
    fn head(&self, out: &mut String) {
        out.push_str(&format!("GET {} HTTP/1.0\r\n", self.uri));
        out.push_str("Accept: */*\r\n");
        out.push_str(&format!("User-Agent: {USER_AGENT}\r\n"));
        out.push_str(&format!("Host: {}:{}\r\n", self.host, self.port));
    }

    fn guid_line(&self) -> String {
        format!("Pragma: xClientGUID={{{}}}\r\n", self.client_guid)
    }

    /// Probe request that only fetches the header.
    pub fn first(&self) -> String {
        let mut out = String::with_capacity(512);
        self.head(&mut out);
        out.push_str(
            "Pragma: no-cache,rate=1.000000,stream-time=0,stream-offset=0:0,request-context=1,max-duration=0\r\n",
        );
        out.push_str(&self.guid_line());
        out.push_str("Connection: Close\r\n\r\n");
        out
    }

    /// Playback request for an on-demand stream starting at `start_ms`.
    pub fn seekable(&self, start_ms: u32, streams: &[(u16, bool)]) -> String {
        let mut out = String::with_capacity(640);
        self.head(&mut out);
        out.push_str(&format!(
            "Pragma: no-cache,rate=1.000000,stream-time={start_ms},stream-offset=0:0,request-context=2,max-duration=0\r\n"
        ));
        out.push_str(&self.guid_line());
        out.push_str("Pragma: xPlayStrm=1\r\n");
        push_switch_lines(&mut out, streams);
        out.push_str("Connection: Close\r\n\r\n");
        out
    }

    /// Playback request for a broadcast.
    pub fn live(&self, streams: &[(u16, bool)]) -> String {
        let mut out = String::with_capacity(640);
        self.head(&mut out);
        out.push_str("Pragma: no-cache,rate=1.000000,request-context=2\r\n");
        out.push_str("Pragma: xPlayStrm=1\r\n");
        out.push_str(&self.guid_line());
        push_switch_lines(&mut out, streams);
        out.push_str("Connection: Close\r\n\r\n");
        out
    }
}

/// `ffff:<number>:0` for selected streams, `:2` for disabled ones.
fn push_switch_lines(out: &mut String, streams: &[(u16, bool)]) {
    out.push_str(&format!("Pragma: stream-switch-count={}\r\n", streams.len()));
    out.push_str("Pragma: stream-switch-entry=");
    for &(number, selected) in streams {
        out.push_str(&format!("ffff:{}:{} ", number, if selected { 0 } else { 2 }));
    }
    out.push_str("\r\n");
}

/// Parsed response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub stream_kind: Option<StreamKind>,
}

impl ResponseHead {
    /// Check the status line and scan the headers. `lines` excludes the
    /// terminating blank line.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Self> {
        let status_line: &str = match lines.first() {
            Some(line) => line.as_ref(),
            None => return Err(Error::protocol("empty response")),
        };
        let status = parse_status_line(status_line)?;
        if (300..400).contains(&status) {
            return Err(Error::unsupported(format!("HTTP redirect: {status_line}")));
        }
        if !(200..300).contains(&status) {
            return Err(Error::protocol(format!("HTTP status not 2xx: {status_line}")));
        }

        let mut stream_kind = None;
        for line in &lines[1..] {
            let line: &str = line.as_ref();
            if starts_with_ignore_case(line, "Location: ") {
                return Err(Error::unsupported("Location redirect"));
            }
            if starts_with_ignore_case(line, "Pragma:") {
                if let Some(at) = line[7..].find("features=") {
                    let features = &line[7 + at..];
                    if features.contains("seekable") {
                        stream_kind = Some(StreamKind::Seekable);
                    } else if features.contains("broadcast") {
                        stream_kind = Some(StreamKind::Live);
                    }
                }
            }
        }
        Ok(Self { status, stream_kind })
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// `HTTP/<major>.<minor> <code> <reason>`; the reason must not be empty.
fn parse_status_line(line: &str) -> Result<u16> {
    let bad = || Error::protocol(format!("bad response format: {line}"));
    let rest = line.strip_prefix("HTTP/").ok_or_else(bad)?;
    let (version, rest) = rest.split_once(' ').ok_or_else(bad)?;
    let (major, minor) = version.split_once('.').ok_or_else(bad)?;
    if major.parse::<u32>().is_err() || minor.parse::<u32>().is_err() {
        return Err(bad());
    }
    let (code, reason) = rest.trim_start().split_once(' ').ok_or_else(bad)?;
    if reason.trim().is_empty() {
        return Err(bad());
    }
    code.parse::<u16>().map_err(|_| bad())
}
