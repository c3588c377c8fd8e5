//! Remote side: decode framed requests, fetch upstream, reply
//!
//! Each accepted link runs one dispatcher loop:
//! `await frame -> classify -> {CONNECT tunnel | plain HTTP} -> await frame`.
//! The loop ends only when the link closes or breaks; a failed request is
//! answered with a framed 502 and the loop carries on.

use super::ProxyError;
use crate::protocol::{
    find_header_end, is_connect, parse_request_line, rewrite_for_origin, ProtocolError,
    TargetAddr, BAD_GATEWAY, CONNECTION_ESTABLISHED, DEFAULT_HTTP_PORT, READ_CHUNK_SIZE,
};
use crate::transport::connect;
use crate::tunnel::{read_frame, splice, write_frame, RelayConfig, TunnelError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Remote side tuning
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Origin port for targets that name none
    pub http_port: u16,
    /// Bound on reaching an upstream
    pub connect_timeout: Duration,
    /// Bound on each read of an origin response
    pub upstream_read_timeout: Duration,
    /// Tunnel relay tuning
    pub relay: RelayConfig,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            connect_timeout: Duration::from_secs(10),
            upstream_read_timeout: Duration::from_secs(30),
            relay: RelayConfig::default(),
        }
    }
}

/// Serves framed requests arriving over links from the local side
#[derive(Clone)]
pub struct Dispatcher {
    settings: Arc<RemoteSettings>,
}

impl Dispatcher {
    pub fn new(settings: RemoteSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Accept links forever, one dispatcher loop per link
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            let (mut stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Accept error: {}", e);
                    continue;
                }
            };
            stream.set_nodelay(true).ok();
            info!("New link from {}", peer);

            let dispatcher = self.clone();
            tokio::spawn(async move {
                match dispatcher.dispatch(&mut stream, peer).await {
                    Ok(()) => info!("Link from {} closed", peer),
                    Err(e) => warn!("Link from {} dropped: {}", peer, e),
                }
            });
        }
    }

    /// Run the request loop on one link until it closes.
    ///
    /// Returns an error only when the link itself breaks (truncated frame,
    /// reset); request-level failures are answered with a 502.
    pub async fn dispatch<S>(&self, link: &mut S, peer: SocketAddr) -> Result<(), TunnelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!("Processing requests from {}", peer);
        loop {
            let frame = match read_frame(link).await? {
                Some(frame) => frame,
                None => {
                    debug!("{} closed the link", peer);
                    return Ok(());
                }
            };
            debug!("Received framed request of {} bytes", frame.payload.len());

            let result = if is_connect(&frame.payload) {
                self.tunnel(link, &frame.payload).await
            } else {
                self.fetch(link, &frame.payload).await
            };

            if let Err(e) = result {
                warn!("Request failed: {}", e);
                if let Err(e) = write_frame(link, BAD_GATEWAY).await {
                    debug!("Could not deliver 502: {}", e);
                }
            }
            debug!("Waiting for next request...");
        }
    }

    /// CONNECT: open the upstream, acknowledge, then relay raw bytes
    async fn tunnel<S>(&self, link: &mut S, payload: &[u8]) -> Result<(), ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let first_line = payload.split(|&b| b == b'\n').next().unwrap_or_default();
        let first_line =
            std::str::from_utf8(first_line).map_err(|_| ProtocolError::InvalidEncoding)?;
        let line = parse_request_line(first_line)?;
        let target = TargetAddr::parse(&line.target, None)?;

        info!("Establishing tunnel to {}", target);
        let mut upstream = self.open_upstream(&target).await?;
        write_frame(link, CONNECTION_ESTABLISHED).await?;

        // Bytes the client sent right behind its CONNECT head belong upstream
        if let Some(end) = find_header_end(payload) {
            if end < payload.len() {
                upstream.write_all(&payload[end..]).await?;
            }
        }

        let summary = splice(
            link,
            &mut upstream,
            &self.settings.relay,
            ("link->upstream", "upstream->link"),
        )
        .await;
        info!(
            "Tunnel to {} closed ({} bytes up, {} bytes down)",
            target,
            summary.forward.map(|o| o.bytes).unwrap_or(0),
            summary.backward.map(|o| o.bytes).unwrap_or(0)
        );
        Ok(())
    }

    /// Plain HTTP: rewrite, fetch until the origin closes, reply in one frame
    async fn fetch<S>(&self, link: &mut S, payload: &[u8]) -> Result<(), ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = rewrite_for_origin(payload, self.settings.http_port)?;
        debug!("HTTP request to {}", request.addr);

        let mut upstream = self.open_upstream(&request.addr).await?;
        upstream.write_all(&request.bytes).await?;

        let response = self.read_response(&mut upstream, &request.addr).await?;
        write_frame(link, &response).await?;
        upstream.shutdown().await.ok();

        debug!(
            "HTTP response of {} bytes from {} relayed back",
            response.len(),
            request.addr
        );
        Ok(())
    }

    async fn open_upstream(&self, target: &TargetAddr) -> Result<TcpStream, ProxyError> {
        connect((target.host.as_str(), target.port), self.settings.connect_timeout)
            .await
            .map_err(|source| ProxyError::UpstreamConnect {
                target: target.to_string(),
                source,
            })
    }

    /// Everything the origin sends until it closes; no length parsing
    async fn read_response(
        &self,
        upstream: &mut TcpStream,
        target: &TargetAddr,
    ) -> Result<Vec<u8>, ProxyError> {
        let mut response = Vec::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = tokio::time::timeout(self.settings.upstream_read_timeout, upstream.read(&mut buf))
                .await
                .map_err(|_| ProxyError::UpstreamTimeout(target.to_string()))??;
            if n == 0 {
                return Ok(response);
            }
            response.extend_from_slice(&buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    /// Origin that records one request head and answers with `reply`
    async fn one_shot_origin(reply: &'static [u8]) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            while find_header_end(&seen).is_none() {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            socket.write_all(reply).await.unwrap();
            seen
        });
        (addr, handle)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_http_request_is_rewritten_and_answered() {
        let (origin, seen) = one_shot_origin(b"HTTP/1.1 200 OK\r\n\r\nhello").await;
        let dispatcher = Dispatcher::new(RemoteSettings {
            http_port: origin.port(),
            ..RemoteSettings::default()
        });

        let (mut local, mut remote) = duplex(4096);
        let task = tokio::spawn(async move { dispatcher.dispatch(&mut remote, peer()).await });

        write_frame(
            &mut local,
            b"GET http://127.0.0.1/a/b HTTP/1.1\r\nProxy-Connection: keep-alive\r\n\r\n",
        )
        .await
        .unwrap();
        let reply = read_frame(&mut local).await.unwrap().unwrap();
        assert_eq!(&reply.payload[..], b"HTTP/1.1 200 OK\r\n\r\nhello");

        let request = String::from_utf8(seen.await.unwrap()).unwrap();
        assert!(request.starts_with("GET /a/b HTTP/1.1\r\nHost: 127.0.0.1\r\n"));
        assert!(!request.contains("Proxy-Connection"));
        assert!(request.contains("Connection: close\r\n"));

        drop(local);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_link_alive() {
        let port = closed_port().await;
        let (origin, _seen) = one_shot_origin(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        let dispatcher = Dispatcher::new(RemoteSettings {
            http_port: origin.port(),
            ..RemoteSettings::default()
        });

        let (mut local, mut remote) = duplex(4096);
        let task = tokio::spawn(async move { dispatcher.dispatch(&mut remote, peer()).await });

        let connect = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", port);
        write_frame(&mut local, connect.as_bytes()).await.unwrap();
        let reply = read_frame(&mut local).await.unwrap().unwrap();
        assert_eq!(&reply.payload[..], BAD_GATEWAY);

        // Same link still serves the next request
        write_frame(&mut local, b"GET http://127.0.0.1/ HTTP/1.1\r\n\r\n").await.unwrap();
        let reply = read_frame(&mut local).await.unwrap().unwrap();
        assert_eq!(&reply.payload[..], b"HTTP/1.1 204 No Content\r\n\r\n");

        drop(local);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unparsable_request_gets_502() {
        let dispatcher = Dispatcher::new(RemoteSettings::default());
        let (mut local, mut remote) = duplex(4096);
        let task = tokio::spawn(async move { dispatcher.dispatch(&mut remote, peer()).await });

        write_frame(&mut local, b"CONNECT nowhere HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(&read_frame(&mut local).await.unwrap().unwrap().payload[..], BAD_GATEWAY);

        write_frame(&mut local, b"GARBAGE\r\n\r\n").await.unwrap();
        assert_eq!(&read_frame(&mut local).await.unwrap().unwrap().payload[..], BAD_GATEWAY);

        drop(local);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_connect_tunnel_relays_raw_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = listener.local_addr().unwrap();
        let echo = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                socket.write_all(&buf[..n]).await.unwrap();
            }
        });

        let dispatcher = Dispatcher::new(RemoteSettings::default());
        let (mut local, mut remote) = duplex(4096);
        let task = tokio::spawn(async move { dispatcher.dispatch(&mut remote, peer()).await });

        let connect = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", origin, origin);
        write_frame(&mut local, connect.as_bytes()).await.unwrap();
        let ack = read_frame(&mut local).await.unwrap().unwrap();
        assert_eq!(&ack.payload[..], CONNECTION_ESTABLISHED);

        // Raw mode: no framing from here on
        local.write_all(b"raw tunnel bytes").await.unwrap();
        let mut buf = [0u8; 16];
        local.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"raw tunnel bytes");

        local.shutdown().await.unwrap();
        let mut rest = Vec::new();
        local.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        drop(local);
        assert!(task.await.unwrap().is_ok());
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_frame_ends_dispatch() {
        let dispatcher = Dispatcher::new(RemoteSettings::default());
        let (mut local, mut remote) = duplex(4096);
        let task = tokio::spawn(async move { dispatcher.dispatch(&mut remote, peer()).await });

        local.write_all(&[0, 0, 0, 50, b'G', b'E']).await.unwrap();
        drop(local);

        assert!(matches!(
            task.await.unwrap(),
            Err(TunnelError::Truncated { expected: 50, received: 2 })
        ));
    }
}
