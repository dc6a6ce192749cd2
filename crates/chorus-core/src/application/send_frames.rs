//! SendFrames use case — pumps captured frames to the relay.

use std::sync::Arc;

use tracing::trace;

use super::ports::{AudioCapture, FrameTransport};

/// Reads frames from a capture source and ships them to the relay.
pub struct SendFramesUseCase {
    transport: Arc<dyn FrameTransport>,
}

impl SendFramesUseCase {
    pub fn new(transport: Arc<dyn FrameTransport>) -> Self {
        Self { transport }
    }

    /// Run the send loop until the capture source or the transport fails.
    pub async fn run(&self, capture: &mut dyn AudioCapture) -> anyhow::Result<()> {
        loop {
            let frame = capture.next_frame().await?;
            let len = frame.len();
            self.transport.send_frame(frame).await?;
            trace!(len, "sent frame");
        }
    }
}
