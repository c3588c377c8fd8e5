//! Plain TCP dialing

use super::{Dialer, TransportConfig, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Connect with a bound on the whole attempt (resolution included)
pub async fn connect<A>(addr: A, timeout: Duration) -> Result<TcpStream, TransportError>
where
    A: ToSocketAddrs,
{
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(TransportError::Io)?;

    // Small frames (length prefixes, status lines) should not wait on Nagle
    stream.set_nodelay(true).ok();

    Ok(stream)
}

/// Dials the remote side over raw TCP
pub struct TcpDialer {
    addr: String,
    config: TransportConfig,
}

impl TcpDialer {
    /// Create a new TCP dialer
    pub fn new(addr: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> Result<TcpStream, TransportError> {
        let timeout = Duration::from_secs(self.config.connect_timeout);
        connect(self.addr.as_str(), timeout).await.map_err(|e| match e {
            TransportError::Io(io) => {
                TransportError::ConnectionFailed(format!("{}: {}", self.addr, io))
            }
            other => other,
        })
    }

    fn peer(&self) -> &str {
        &self.addr
    }
}
