//! ReceiveFrames use case — pumps mixed frames from the relay into playback.

use std::sync::Arc;

use tracing::{trace, warn};

use super::ports::{AudioPlayback, FrameTransport};

/// Receives mixed frames and feeds them to the playback sink.
pub struct ReceiveFramesUseCase {
    transport: Arc<dyn FrameTransport>,
    playback: Arc<dyn AudioPlayback>,
}

impl ReceiveFramesUseCase {
    pub fn new(transport: Arc<dyn FrameTransport>, playback: Arc<dyn AudioPlayback>) -> Self {
        Self {
            transport,
            playback,
        }
    }

    /// Run the receive loop until the transport fails. A playback hiccup is
    /// logged and skipped; the stream keeps flowing.
    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            let frame = self.transport.recv_frame().await?;
            trace!(len = frame.len(), "received frame");
            if let Err(e) = self.playback.play_frame(&frame).await {
                warn!("failed to play frame: {e}");
            }
        }
    }
}
