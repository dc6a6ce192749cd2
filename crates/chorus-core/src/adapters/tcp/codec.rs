//! Length-prefixed frame codec over a reliable byte stream.
//!
//! Every message is a 4-byte big-endian unsigned length followed by exactly
//! that many payload bytes. TCP has no message boundaries, so the prefix is
//! what lets the receiver reassemble whole audio frames.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame payload (16 MiB). Anything larger is a
/// protocol violation, not audio.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a frame read or write failed. All variants are fatal for the owning
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection (EOF mid-read, or the write side found
    /// the peer gone).
    #[error("peer closed the connection")]
    Closed,
    /// Any other transport-level I/O failure.
    #[error("transport error: {0}")]
    Io(#[source] std::io::Error),
    /// The length prefix was zero or exceeded [`MAX_FRAME_LEN`].
    #[error("invalid frame length {0}")]
    BadLength(u32),
}

fn classify(e: std::io::Error) -> FrameError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::WriteZero => FrameError::Closed,
        _ => FrameError::Io(e),
    }
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Read one length-prefixed frame. Short reads are retried internally until
/// the full count arrives; EOF before completion is [`FrameError::Closed`].
pub async fn read_frame<R>(stream: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(classify)?;
    let len = u32::from_be_bytes(len_buf);

    if len == 0 || len as usize > MAX_FRAME_LEN {
        return Err(FrameError::BadLength(len));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.map_err(classify)?;
    Ok(Bytes::from(payload))
}

/// Write one length-prefixed frame, flushing before returning.
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = (payload.len() as u32).to_be_bytes();
    stream.write_all(&len).await.map_err(classify)?;
    stream.write_all(payload).await.map_err(classify)?;
    stream.flush().await.map_err(classify)?;
    Ok(())
}
