//! The persistent link to the remote side
//!
//! At most one [`Link`] is alive at a time. The [`LinkManager`] is owned by
//! the sequential processor, so exclusive access is a borrow, not a lock.

use super::{Dialer, TcpDialer, TransportError};
use crate::tunnel::{read_frame, write_frame, Frame, TunnelError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// One established connection to the remote side
pub struct Link {
    id: u64,
    stream: TcpStream,
}

impl Link {
    fn new(id: u64, stream: TcpStream) -> Self {
        Self { id, stream }
    }

    /// Generation number of this link, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Raw stream, for relaying a tunnel
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Send one framed message
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TunnelError> {
        debug!("Link {}: sending frame of {} bytes", self.id, payload.len());
        write_frame(&mut self.stream, payload).await
    }

    /// Receive one framed message, `None` if the remote side hung up
    pub async fn recv(&mut self) -> Result<Option<Frame>, TunnelError> {
        let frame = read_frame(&mut self.stream).await?;
        if let Some(frame) = &frame {
            debug!("Link {}: received frame of {} bytes", self.id, frame.payload.len());
        }
        Ok(frame)
    }
}

/// Owns the persistent link and rebuilds it on demand
pub struct LinkManager<D: Dialer = TcpDialer> {
    dialer: D,
    link: Option<Link>,
    opened: u64,
}

impl<D: Dialer> LinkManager<D> {
    /// Create a manager; nothing is dialed until [`current`](Self::current)
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            link: None,
            opened: 0,
        }
    }

    /// The live link, dialing a new one if there is none
    pub async fn current(&mut self) -> Result<&mut Link, TransportError> {
        if self.link.is_none() {
            debug!("Connecting to remote side at {}...", self.dialer.peer());
            let stream = self.dialer.dial().await?;
            self.opened += 1;
            info!(
                "Persistent link {} established to {}",
                self.opened,
                self.dialer.peer()
            );
            self.link = Some(Link::new(self.opened, stream));
        }

        self.link.as_mut().ok_or(TransportError::Closed)
    }

    /// Close the current link, if any; the next `current()` dials afresh
    pub async fn invalidate(&mut self) {
        if let Some(mut link) = self.link.take() {
            debug!("Closing persistent link {}", link.id);
            link.stream.shutdown().await.ok();
        }
    }
}
