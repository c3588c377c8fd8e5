//! # Ferrylink
//!
//! A two-sided HTTP/HTTPS proxy overlay for constrained links. The local
//! side accepts any number of concurrent proxy clients but pushes their
//! requests over one persistent transport connection strictly one at a
//! time. The remote side terminates that connection, performs the real
//! fetch or CONNECT tunnel and streams the result back.
//!
//! ## Architecture
//!
//! ```text
//!  clients ──► ┌──────────────────────┐  framed link  ┌──────────────────┐ ──► origins
//!  clients ──► │ local: FIFO queue ►  │ ════════════► │ remote:          │
//!  clients ──► │ single-flight loop   │ ◄════════════ │ dispatcher loop  │
//!              └──────────────────────┘  (raw relay    └──────────────────┘
//!                                         after CONNECT)
//! ```
//!
//! ## Wire protocol
//!
//! Every message on the persistent link is a frame: a 4-byte big-endian
//! length followed by that many bytes. Requests and responses strictly
//! alternate. After a CONNECT exchange the link carries raw tunnel bytes
//! until the tunnel ends; the local side then discards the link and dials
//! a new one.

pub mod config;
pub mod protocol;
pub mod proxy;
pub mod transport;
pub mod tunnel;

pub use config::Config;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port of the remote side
pub const DEFAULT_REMOTE_PORT: u16 = 9999;

/// Default client-facing port of the local side
pub const DEFAULT_LOCAL_PORT: u16 = 8080;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Configuration error: {0}")]
    Config(String),
}
