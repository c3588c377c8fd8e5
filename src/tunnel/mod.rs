//! Tunnel layer - what travels over the persistent link
//!
//! Provides:
//! - Length-prefixed frame encoding/decoding
//! - Raw byte relay for CONNECT tunnels

mod frame;
mod relay;

pub use frame::{read_frame, write_frame, Frame, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use relay::{relay, splice, RelayConfig, RelayEnd, RelayOutcome, SpliceSummary};

use std::time::Duration;
use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Truncated frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default inactivity bound for a relay direction (30 s)
pub const DEFAULT_RELAY_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default relay read size (4 KB)
pub const DEFAULT_RELAY_CHUNK_SIZE: usize = 4096;
