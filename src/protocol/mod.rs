//! Protocol definitions and constants
//!
//! The link protocol itself is only frames (see [`crate::tunnel`]); what
//! lives here is the little HTTP knowledge both sides need: request-line
//! parsing, the origin rewrite and the canned status lines.

mod request;

pub use request::{
    find_header_end, is_connect, is_success_status, method_token, parse_request_line,
    rewrite_for_origin, OriginRequest, RequestLine, TargetAddr,
};

use std::time::Duration;
use thiserror::Error;

/// Client request errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Empty request line")]
    EmptyRequestLine,

    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Request head is not valid UTF-8")]
    InvalidEncoding,
}

/// Blank line ending an HTTP header block
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Tunnel acknowledgement sent back for a successful CONNECT
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Fallback reply for every failed transaction
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

/// Method token that switches a transaction to tunnel mode
pub const CONNECT_METHOD: &str = "CONNECT";

/// Origin port when an absolute-form target names none
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Per-read bound while collecting a client's request head (2 s)
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Read size for client request heads and origin responses
pub const READ_CHUNK_SIZE: usize = 4096;
