//! Local side: concurrent ingress, single-flight processing
//!
//! Clients are accepted concurrently and parked in an unbounded FIFO in
//! arrival order. One processor drains the queue and runs each client's
//! transaction to completion over the persistent link before touching the
//! next one, so at most one transaction is ever in flight on the link.

use super::ProxyError;
use crate::protocol::{
    find_header_end, is_connect, is_success_status, method_token, BAD_GATEWAY,
    HEADER_READ_TIMEOUT, READ_CHUNK_SIZE,
};
use crate::transport::{Dialer, LinkManager, TcpDialer};
use crate::tunnel::{splice, RelayConfig, SpliceSummary};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Local side tuning
#[derive(Debug, Clone)]
pub struct LocalSettings {
    /// Per-read bound while collecting a request head
    pub header_read_timeout: Duration,
    /// Tunnel relay tuning
    pub relay: RelayConfig,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            header_read_timeout: HEADER_READ_TIMEOUT,
            relay: RelayConfig::default(),
        }
    }
}

/// A client connection waiting for its turn
#[derive(Debug)]
pub struct PendingClient {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Arrival number, starting at 1
    pub seq: u64,
}

/// How a client transaction ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// Client sent nothing in time; the link was not touched
    Empty,
    /// Plain HTTP exchange; the link stays up for the next client
    Http { response_bytes: usize },
    /// CONNECT answered with a non-2xx reply; no tunnel was opened
    Refused,
    /// CONNECT tunnel ran and the link was recycled
    Tunnel(SpliceSummary),
}

/// Accept clients and queue them in arrival order.
///
/// Never reads from a client. Returns once the processor has gone away.
pub async fn ingress(listener: TcpListener, queue: mpsc::UnboundedSender<PendingClient>) {
    let mut seq = 0u64;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("Accept error: {}", e);
                continue;
            }
        };

        seq += 1;
        debug!("Client #{} from {} enqueued", seq, peer);
        if queue.send(PendingClient { stream, peer, seq }).is_err() {
            info!("Request queue closed, no longer accepting clients");
            return;
        }
    }
}

/// The single-flight processor and the link it owns
pub struct LocalProxy<D: Dialer = TcpDialer> {
    links: LinkManager<D>,
    settings: LocalSettings,
}

impl<D: Dialer> LocalProxy<D> {
    pub fn new(dialer: D, settings: LocalSettings) -> Self {
        Self {
            links: LinkManager::new(dialer),
            settings,
        }
    }

    /// Open the persistent link ahead of the first client. A failure is
    /// only logged; the first transaction dials again.
    pub async fn warm_up(&mut self) {
        if let Err(e) = self.links.current().await {
            warn!("Persistent link not available yet: {}", e);
        }
    }

    /// Bind-free entry point: queue clients from `listener` and serve them
    /// one by one until the listener task ends.
    pub async fn run(mut self, listener: TcpListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(ingress(listener, tx));
        self.warm_up().await;
        self.process(rx).await;
        acceptor.abort();
    }

    /// Serve queued clients strictly in order until every sender is gone
    pub async fn process(&mut self, mut queue: mpsc::UnboundedReceiver<PendingClient>) {
        while let Some(mut client) = queue.recv().await {
            debug!("Serving client #{} from {}", client.seq, client.peer);

            match self.serve(&mut client.stream).await {
                Ok(outcome) => debug!("Client #{} done: {:?}", client.seq, outcome),
                Err(e) => {
                    warn!("Client #{} from {} failed: {}", client.seq, client.peer, e);
                    if e.poisons_link() {
                        self.links.invalidate().await;
                    }
                    client.stream.write_all(BAD_GATEWAY).await.ok();
                }
            }

            client.stream.shutdown().await.ok();
            debug!("Client #{} socket closed", client.seq);
        }
        info!("Request queue drained and closed");
    }

    /// One full transaction for one client
    async fn serve(&mut self, client: &mut TcpStream) -> Result<Transaction, ProxyError> {
        let request = read_request_head(client, self.settings.header_read_timeout).await?;
        if request.is_empty() {
            debug!("Empty request from client");
            return Ok(Transaction::Empty);
        }

        method_token(&request)?;
        let tunnel = is_connect(&request);
        debug!(
            "Handling request: {}",
            String::from_utf8_lossy(request.split(|&b| b == b'\r').next().unwrap_or_default())
        );

        let link = self.links.current().await?;
        link.send(&request).await?;
        let reply = link.recv().await?.ok_or(ProxyError::NoReply)?;
        if reply.payload.is_empty() {
            return Err(ProxyError::EmptyReply);
        }
        let link_id = link.id();

        if !tunnel {
            client.write_all(&reply.payload).await?;
            debug!("HTTP response sent, link {} ready for next request", link_id);
            return Ok(Transaction::Http {
                response_bytes: reply.payload.len(),
            });
        }

        if !is_success_status(&reply.payload) {
            debug!("Tunnel refused by remote side");
            client.write_all(&reply.payload).await?;
            return Ok(Transaction::Refused);
        }

        // The remote side is relaying raw bytes now: from here on the link
        // is never reused for frames
        if let Err(e) = client.write_all(&reply.payload).await {
            self.links.invalidate().await;
            return Err(e.into());
        }

        let summary = splice(
            client,
            link.stream_mut(),
            &self.settings.relay,
            ("client->link", "link->client"),
        )
        .await;

        self.links.invalidate().await;
        match self.links.current().await {
            Ok(fresh) => info!("Tunnel closed, link {} replaced by link {}", link_id, fresh.id()),
            Err(e) => warn!("Tunnel closed, could not reconnect yet: {}", e),
        }

        Ok(Transaction::Tunnel(summary))
    }
}

/// Read until the client closes, stops sending for `per_read`, or the
/// bytes so far contain the end of the header block.
async fn read_request_head(client: &mut TcpStream, per_read: Duration) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match tokio::time::timeout(per_read, client.read(&mut buf)).await {
            Err(_) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                data.extend_from_slice(&buf[..n]);
                if find_header_end(&data).is_some() {
                    break;
                }
            }
            Ok(Err(e)) => return Err(e),
        }
    }
    Ok(data)
}
