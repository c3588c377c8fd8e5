//! Frame encoding/decoding for the persistent link
//!
//! Frame format:
//! ```text
//! +--------+--------+--------+--------+
//! |        Length (4B, big endian)    |
//! +--------+--------+--------+--------+
//! |        Payload (Length bytes)     |
//! +--------+--------+--------+--------+
//! ```
//!
//! A frame always carries one whole message: a full HTTP request head, a
//! full origin response or a tunnel acknowledgement.

use super::TunnelError;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Frame header size in bytes
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest payload a frame can declare
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Initial body buffer reservation, so a bogus length cannot force a huge
/// allocation before any payload byte has arrived.
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

/// A length-prefixed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload data
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame around a payload
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> Result<BytesMut, TunnelError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_SIZE {
            return Err(TunnelError::FrameTooLarge(len));
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + len);
        buf.put_u32(len as u32);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Read one frame from a stream.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before the
/// first header byte. A stream that ends anywhere inside a frame yields
/// [`TunnelError::Truncated`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, TunnelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TunnelError::Truncated {
                expected: FRAME_HEADER_SIZE,
                received: filled,
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    let mut body = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
    (&mut *reader).take(len as u64).read_to_end(&mut body).await?;
    if body.len() < len {
        return Err(TunnelError::Truncated {
            expected: len,
            received: body.len(),
        });
    }

    trace!("Read frame of {} bytes", len);
    Ok(Some(Frame::new(body)))
}

/// Encode `payload` as one frame and write it out in a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TunnelError>
where
    W: AsyncWrite + Unpin,
{
    let wire = Frame::new(Bytes::copy_from_slice(payload)).encode()?;
    writer.write_all(&wire).await?;
    writer.flush().await?;
    trace!("Wrote frame of {} bytes", payload.len());
    Ok(())
}
