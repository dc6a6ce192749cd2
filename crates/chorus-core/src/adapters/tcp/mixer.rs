//! The mix inbox and the periodic mixer task.
//!
//! Ingress readers deposit raw frames here; a single mixer task drains the
//! inbox every 20 ms, folds whatever arrived into one canonical frame, and
//! fans it out to every active client's send queue. Decoupling readers from
//! the mix keeps the read path short and collapses near-simultaneous frames
//! into one mixing cycle.

use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain::frame::{mix_frames, FRAME_MILLIS};

use super::entry::Registry;

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

/// Frames received from all clients since the last mixer tick, in arrival
/// order. Drained atomically by swapping in an empty container.
#[derive(Default)]
pub struct MixInbox {
    pending: Mutex<Vec<Bytes>>,
}

impl MixInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, frame: Bytes) {
        self.pending.lock().unwrap().push(frame);
    }

    pub fn drain(&self) -> Vec<Bytes> {
        mem::take(&mut *self.pending.lock().unwrap())
    }
}

// ---------------------------------------------------------------------------
// Mixer task
// ---------------------------------------------------------------------------

/// Mix one batch and enqueue the result onto every active entry.
///
/// Returns the number of receivers. The registry lock is held only for the
/// queue pushes; the senders do the socket writes on their own tasks.
fn publish_mix(registry: &Registry, pending: &[Bytes]) -> usize {
    let mixed = mix_frames(pending);
    let mut receivers = 0;
    registry.for_each_active(|entry| {
        entry.push_frame(mixed.clone());
        receivers += 1;
    });
    receivers
}

/// Run the mixer until shutdown. One instance per relay.
///
/// The interval is driven by the monotonic clock, so a tick that overruns
/// its 20 ms budget is followed immediately by a catch-up tick instead of
/// accumulating drift. A tick with an empty inbox does nothing.
pub async fn run(registry: Arc<Registry>, inbox: Arc<MixInbox>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MILLIS));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("mixer stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let pending = inbox.drain();
        if pending.is_empty() {
            continue;
        }

        let receivers = publish_mix(&registry, &pending);
        trace!(
            contributors = pending.len(),
            receivers,
            "published mixed frame"
        );
    }
}
