//! Request-line parsing and the origin-form rewrite

use super::{ProtocolError, CONNECT_METHOD, HEADER_TERMINATOR};
use std::fmt;

/// First line of an HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

/// Host and port of an upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddr {
    /// Domain or IP literal, without IPv6 brackets
    pub host: String,
    pub port: u16,
}

impl TargetAddr {
    /// Parse `host:port`, `[v6]:port`, or a bare host when `default_port`
    /// is given.
    pub fn parse(authority: &str, default_port: Option<u16>) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidTarget(authority.to_string());

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return Err(invalid()),
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => default_port.ok_or_else(invalid)?,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A request rewritten for direct delivery to its origin
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub addr: TargetAddr,
    pub bytes: Vec<u8>,
}

/// Parse `METHOD target [VERSION]`
pub fn parse_request_line(line: &str) -> Result<RequestLine, ProtocolError> {
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or(ProtocolError::EmptyRequestLine)?;
    let target = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidRequestLine(line.to_string()))?;
    let version = parts.next().unwrap_or("HTTP/1.1");

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
    })
}

/// Upper-cased method token of a raw request, decoding leniently
pub fn method_token(data: &[u8]) -> Result<String, ProtocolError> {
    let first_line = data
        .split(|&b| b == b'\n')
        .next()
        .unwrap_or_default();
    String::from_utf8_lossy(first_line)
        .split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .ok_or(ProtocolError::EmptyRequestLine)
}

/// Whether a request asks for a tunnel: the whole method token is
/// `CONNECT`. Both sides of the link classify requests with this.
pub fn is_connect(payload: &[u8]) -> bool {
    method_token(payload).is_ok_and(|method| method == CONNECT_METHOD)
}

/// Offset just past the first blank line, if the head is complete
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|i| i + HEADER_TERMINATOR.len())
}

/// Whether a reply starts with a `2xx` status line
pub fn is_success_status(reply: &[u8]) -> bool {
    let Some(rest) = reply.strip_prefix(b"HTTP/") else {
        return false;
    };
    match rest.iter().position(|&b| b == b' ') {
        Some(i) => rest.get(i + 1) == Some(&b'2'),
        None => false,
    }
}

fn header_name_is(line: &str, name: &str) -> bool {
    line.split_once(':')
        .map(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.split_once(':')
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Rewrite an absolute-form proxy request into an origin-form request.
///
/// `GET http://host/a HTTP/1.x` becomes `GET /a HTTP/1.1`; proxy and
/// connection headers are dropped, `Host` is inserted when absent and
/// `Connection: close` is appended. Body bytes are passed through.
pub fn rewrite_for_origin(payload: &[u8], default_port: u16) -> Result<OriginRequest, ProtocolError> {
    let (head, body) = match find_header_end(payload) {
        Some(end) => (&payload[..end - HEADER_TERMINATOR.len()], &payload[end..]),
        None => (payload, &[][..]),
    };
    let head = std::str::from_utf8(head).map_err(|_| ProtocolError::InvalidEncoding)?;

    let mut lines = head.lines();
    let line = parse_request_line(lines.next().ok_or(ProtocolError::EmptyRequestLine)?)?;

    let url = line.target.strip_prefix("http://").unwrap_or(line.target.as_str());
    let (authority, path) = match url.find('/') {
        Some(i) => (&url[..i], &url[i..]),
        None => (url, ""),
    };
    let path = if path.is_empty() { "/" } else { path };

    let headers: Vec<&str> = lines
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !header_name_is(l, "proxy-connection") && !header_name_is(l, "connection"))
        .collect();
    let existing_host = headers.iter().find_map(|l| header_value(l, "host"));

    let authority = match (authority.is_empty(), existing_host) {
        (false, _) => authority,
        (true, Some(host)) => host,
        (true, None) => return Err(ProtocolError::InvalidTarget(line.target.clone())),
    };
    let addr = TargetAddr::parse(authority, Some(default_port))?;

    let mut out = format!("{} {} HTTP/1.1\r\n", line.method, path);
    if existing_host.is_none() {
        out.push_str(&format!("Host: {}\r\n", authority));
    }
    for header in &headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str("Connection: close\r\n\r\n");

    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);

    Ok(OriginRequest { addr, bytes })
}
