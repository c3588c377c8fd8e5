//! Transport layer
//!
//! Provides:
//! - Outbound TCP dialing with a connect timeout
//! - The local side's persistent link and its manager

mod link;
mod tcp;

pub use link::{Link, LinkManager};
pub use tcp::{connect, TcpDialer};

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::net::TcpStream;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

/// Something that can open the persistent link
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a fresh connection to the remote side
    async fn dial(&self) -> Result<TcpStream, TransportError>;

    /// Address being dialed, for logs
    fn peer(&self) -> &str;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
        }
    }
}
