//! Client-side TCP [`FrameTransport`] adapter.
//!
//! Wraps one TCP connection to the relay, one lock per direction so the
//! send and receive loops never contend.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::ports::FrameTransport;

use super::codec::{read_frame, write_frame};

/// Client-side [`FrameTransport`] backed by a TCP stream.
pub struct TcpFrameTransport {
    read_half: Mutex<OwnedReadHalf>,
    write_half: Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
}

impl TcpFrameTransport {
    /// Connect to the relay and tune the socket for low latency.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!(%addr, "connected to relay");

        let (read_half, write_half) = stream.into_split();
        Ok(Arc::new(Self {
            read_half: Mutex::new(read_half),
            write_half: Mutex::new(write_half),
            closed: CancellationToken::new(),
        }))
    }
}

#[async_trait]
impl FrameTransport for TcpFrameTransport {
    async fn send_frame(&self, frame: Bytes) -> anyhow::Result<()> {
        let mut write_half = self.write_half.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => anyhow::bail!("transport closed"),
            written = write_frame(&mut *write_half, &frame) => Ok(written?),
        }
    }

    async fn recv_frame(&self) -> anyhow::Result<Bytes> {
        let mut read_half = self.read_half.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => anyhow::bail!("transport closed"),
            read = read_frame(&mut *read_half) => Ok(read?),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
