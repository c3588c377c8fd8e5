//! Raw byte relay used once a tunnel is established
//!
//! A relay pumps one direction. [`splice`] pairs two of them into a full
//! duplex tunnel and waits for both, with a bounded grace period for the
//! slower direction.

use super::{DEFAULT_RELAY_CHUNK_SIZE, DEFAULT_RELAY_IDLE_TIMEOUT};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Relay tuning
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// A direction with no data for this long is finished
    pub idle_timeout: Duration,
    /// Maximum bytes moved per read
    pub chunk_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_RELAY_IDLE_TIMEOUT,
            chunk_size: DEFAULT_RELAY_CHUNK_SIZE,
        }
    }
}

/// Why a relay direction stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Source returned end-of-stream
    SourceClosed,
    /// No data arrived within the idle timeout
    IdleTimeout,
    /// Reading the source failed (reset, aborted)
    ReadError,
    /// Writing the destination failed (broken pipe)
    WriteError,
}

/// Result of one relay direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Bytes moved from source to destination
    pub bytes: u64,
    /// Termination reason
    pub end: RelayEnd,
}

/// Result of a full duplex tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceSummary {
    /// Outcome of the `a -> b` direction, `None` if it was abandoned
    pub forward: Option<RelayOutcome>,
    /// Outcome of the `b -> a` direction, `None` if it was abandoned
    pub backward: Option<RelayOutcome>,
}

/// Copy bytes from `source` to `destination` until the source closes, goes
/// idle, or either side fails. Every ending half-closes the destination.
///
/// Errors are never returned: a reset is an ending like any other.
pub async fn relay<R, W>(
    mut source: R,
    mut destination: W,
    config: &RelayConfig,
    label: &str,
) -> RelayOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut bytes = 0u64;

    let end = loop {
        let n = match timeout(config.idle_timeout, source.read(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!("{}: connection closed", label);
                break RelayEnd::SourceClosed;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("{}: read error: {}", label, e);
                break RelayEnd::ReadError;
            }
            Err(_) => {
                debug!("{}: idle for {:?}", label, config.idle_timeout);
                break RelayEnd::IdleTimeout;
            }
        };

        trace!("{}: relaying {} bytes", label, n);
        if let Err(e) = destination.write_all(&buf[..n]).await {
            debug!("{}: write error: {}", label, e);
            break RelayEnd::WriteError;
        }
        bytes += n as u64;
    };

    // Half-close: the opposite direction owns the other halves
    if let Err(e) = destination.shutdown().await {
        trace!("{}: shutdown error (may be expected): {}", label, e);
    }

    RelayOutcome { bytes, end }
}

/// Run both relay directions between `a` and `b` concurrently.
///
/// Returns once both directions ended, or once the first ended and the
/// second has not followed within `config.idle_timeout`; a direction that
/// misses that bound is abandoned and reported as `None`.
pub async fn splice<A, B>(
    a: &mut A,
    b: &mut B,
    config: &RelayConfig,
    labels: (&str, &str),
) -> SpliceSummary
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let forward = relay(a_read, b_write, config, labels.0);
    let backward = relay(b_read, a_write, config, labels.1);
    tokio::pin!(forward, backward);

    let summary = tokio::select! {
        done = &mut forward => SpliceSummary {
            forward: Some(done),
            backward: timeout(config.idle_timeout, &mut backward).await.ok(),
        },
        done = &mut backward => SpliceSummary {
            forward: timeout(config.idle_timeout, &mut forward).await.ok(),
            backward: Some(done),
        },
    };

    debug!(
        "Tunnel finished: {} -> {:?}, {} -> {:?}",
        labels.0, summary.forward, labels.1, summary.backward
    );
    summary
}
