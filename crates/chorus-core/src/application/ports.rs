//! Port traits (interfaces) that use cases depend on.
//!
//! Adapters implement these traits; use cases never reference tokio's TCP
//! types or cpal.

use async_trait::async_trait;
use bytes::Bytes;

// ---------------------------------------------------------------------------
// FrameTransport (one connection to the relay)
// ---------------------------------------------------------------------------

/// Abstracts one client connection carrying length-prefixed PCM frames in
/// both directions.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Ship one frame to the relay.
    async fn send_frame(&self, frame: Bytes) -> anyhow::Result<()>;

    /// Receive the next mixed frame from the relay.
    async fn recv_frame(&self) -> anyhow::Result<Bytes>;

    /// Actively close the connection. Tasks blocked in `send_frame` /
    /// `recv_frame` will get an error and exit.
    fn close(&self);
}

// ---------------------------------------------------------------------------
// Audio capture & playback
// ---------------------------------------------------------------------------

/// Produces one canonical 20 ms PCM frame at a time from a capture source.
#[async_trait]
pub trait AudioCapture: Send {
    /// Grab the next frame. Paces itself to the capture device (or a timer
    /// for synthetic sources).
    async fn next_frame(&mut self) -> anyhow::Result<Bytes>;
}

/// Accepts received PCM frames for playout.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Queue one frame for the output device. Must not block on the device;
    /// a stalled output should cost samples, not stall the socket reader.
    async fn play_frame(&self, frame: &[u8]) -> anyhow::Result<()>;
}
