use crate::config::TunnelConfig;

/// Header carrying the requested `host:port` target.
pub const HEADER_REAL_HOST: &str = "X-Real-Host";
/// Header carrying the shared secret.
pub const HEADER_PASS: &str = "X-Pass";
/// Presence-only marker: the client sends its real payload in a second
/// packet that must be drained before the handshake proceeds.
pub const HEADER_SPLIT: &str = "X-Split";

/// Handshake acknowledgment masquerading as an HTTP upgrade response. Only
/// the status line matters to middleboxes; the markup is decoration and must
/// not be parsed.
pub const HANDSHAKE_RESPONSE: &[u8] = b"HTTP/1.1 101 <font color=\"null\"></font> \r\n\r\n";

/// Sent verbatim when authentication fails.
pub const FORBIDDEN_RESPONSE: &[u8] = b"HTTP/1.1 403 Forbidden!\r\n\r\n";

/// Scans `buf` for a `"<name>: value\r\n"` line and returns the value.
///
/// Works on raw bytes: the buffer may hold arbitrary binary content around
/// the header line, and the value is decoded lossily. An absent header or a
/// missing CRLF terminator yields `None`, which callers treat as "not
/// provided".
#[must_use]
pub fn find_header(buf: &[u8], name: &str) -> Option<String> {
    let pattern = format!("{name}: ");
    let start = find_subslice(buf, pattern.as_bytes())?;
    let colon = buf[start..].iter().position(|&b| b == b':')? + start;
    let rest = buf.get(colon + 2..)?;
    let end = find_subslice(rest, b"\r\n")?;
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parsed view of the initial client bytes. Exists only for the duration of
/// the handshake phase.
#[derive(Debug)]
pub struct RequestContext {
    pub host_port: String,
    pub secret: Option<String>,
    pub split: bool,
    /// CONNECT-style requests default to port 443 instead of 80 when the
    /// target omits a port.
    pub connect_method: bool,
}

impl RequestContext {
    #[must_use]
    pub fn parse(buf: &[u8], config: &TunnelConfig) -> Self {
        let host_port = find_header(buf, HEADER_REAL_HOST)
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| config.default_host.clone());
        Self {
            host_port,
            secret: find_header(buf, HEADER_PASS),
            split: find_header(buf, HEADER_SPLIT).is_some(),
            connect_method: buf.starts_with(b"CONNECT "),
        }
    }
}
