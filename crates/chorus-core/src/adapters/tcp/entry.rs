//! Per-connection state and the broadcast registry.
//!
//! A [`ClientEntry`] carries everything the relay shares between tasks for
//! one connection: the bounded send queue, the one-way active flag, the
//! sender wake, and the cancellation token that unblocks the reader. The
//! socket halves themselves are owned by the reader and sender tasks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::frame::SEND_QUEUE_FRAMES;
use crate::domain::identity::ClientId;

// ---------------------------------------------------------------------------
// Client entry
// ---------------------------------------------------------------------------

/// Shared state for one connected client.
pub struct ClientEntry {
    pub id: ClientId,
    /// One-way gate: true → false exactly once. The task that wins the flip
    /// owns teardown.
    active: AtomicBool,
    /// Bounded FIFO of mixed frames awaiting transmission.
    queue: Mutex<VecDeque<Bytes>>,
    /// Wakes the egress sender. Exactly one task ever waits on this, so
    /// `notify_one` permit semantics make wake-ups lossless.
    wake: Notify,
    /// Cancelled on teardown; unblocks the reader and a mid-write sender.
    cancel: CancellationToken,
}

impl ClientEntry {
    pub fn new(id: ClientId, cancel: CancellationToken) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::with_capacity(SEND_QUEUE_FRAMES)),
            wake: Notify::new(),
            cancel,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the active flag. Returns true for the single caller that wins
    /// the transition and must perform teardown; false for everyone else.
    pub fn deactivate(&self) -> bool {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Enqueue a mixed frame for this client, dropping the oldest queued
    /// frames first whenever the queue is full. Stale audio is useless for
    /// conversation, so the front of the queue is the right thing to lose.
    /// Returns false (and enqueues nothing) once the entry is deactivated.
    pub fn push_frame(&self, frame: Bytes) -> bool {
        if !self.is_active() {
            return false;
        }
        {
            let mut queue = self.queue.lock().unwrap();
            while queue.len() >= SEND_QUEUE_FRAMES {
                queue.pop_front();
            }
            queue.push_back(frame);
        }
        self.wake.notify_one();
        true
    }

    pub fn pop_frame(&self) -> Option<Bytes> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn clear_queue(&self) {
        self.queue.lock().unwrap().clear();
    }

    /// Wake the sender without enqueueing (used on teardown so it can
    /// observe the inactive flag).
    pub fn wake_sender(&self) {
        self.wake.notify_one();
    }

    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.wake.notified()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of live client entries. The lock guards membership only; frame
/// I/O never happens while it is held.
#[derive(Default)]
pub struct Registry {
    clients: Mutex<HashMap<u64, Arc<ClientEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Arc<ClientEntry>) {
        self.clients.lock().unwrap().insert(entry.id.0, entry);
    }

    pub fn unlink(&self, id: ClientId) -> Option<Arc<ClientEntry>> {
        self.clients.lock().unwrap().remove(&id.0)
    }

    /// Visit every active entry. The callback runs under the membership
    /// lock and must not block (queue pushes are fine, socket writes are
    /// not).
    pub fn for_each_active<F: FnMut(&Arc<ClientEntry>)>(&self, mut f: F) {
        let clients = self.clients.lock().unwrap();
        for entry in clients.values() {
            if entry.is_active() {
                f(entry);
            }
        }
    }

    /// Clone out the current membership, e.g. to retire everything at
    /// shutdown without holding the lock.
    pub fn snapshot(&self) -> Vec<Arc<ClientEntry>> {
        self.clients.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
