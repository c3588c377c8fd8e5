//! Proxy implementations
//!
//! Provides:
//! - The local side: FIFO ingress plus the single-flight processor
//! - The remote side: the per-link request dispatcher

mod local;
mod remote;

pub use local::{ingress, LocalProxy, LocalSettings, PendingClient, Transaction};
pub use remote::{Dispatcher, RemoteSettings};

use crate::protocol::ProtocolError;
use crate::transport::TransportError;
use crate::tunnel::TunnelError;
use thiserror::Error;

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Client protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Framing error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Link error: {0}")]
    Transport(#[from] TransportError),

    #[error("No reply received over the link")]
    NoReply,

    #[error("Empty reply received over the link")]
    EmptyReply,

    #[error("Failed to connect upstream {target}: {source}")]
    UpstreamConnect {
        target: String,
        #[source]
        source: TransportError,
    },

    #[error("Upstream {0} went silent")]
    UpstreamTimeout(String),
}

impl ProxyError {
    /// Whether the persistent link can no longer be trusted to be in step
    /// with the remote side after this error.
    pub fn poisons_link(&self) -> bool {
        matches!(
            self,
            ProxyError::Tunnel(_) | ProxyError::Transport(_) | ProxyError::NoReply
        )
    }
}
