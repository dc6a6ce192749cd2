//! TCP relay server.
//!
//! Accepts client connections, runs one ingress reader and one egress sender
//! per client plus a single global mixer, and tears everything down
//! gracefully on shutdown. Frames received from any client land in the mix
//! inbox; the mixed program fans back out to every connected client,
//! contributors included.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::identity::ClientId;

use super::codec::{read_frame, write_frame};
use super::entry::{ClientEntry, Registry};
use super::mixer::{self, MixInbox};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Port the relay listens on.
pub const RELAY_PORT: u16 = 9797;

/// Send/receive buffer size for the listening socket; accepted sockets
/// inherit it.
const SOCKET_BUFFER_BYTES: u32 = 32 * 1024;

/// Listen backlog request; the OS clamps this to its real maximum
/// (SOMAXCONN), so this asks for as much as the platform allows.
const LISTEN_BACKLOG: u32 = i32::MAX as u32;

// ---------------------------------------------------------------------------
// Relay server
// ---------------------------------------------------------------------------

/// The voice relay: acceptor, registry, inbox, and task lifecycle.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    inbox: Arc<MixInbox>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    next_client_id: AtomicU64,
}

impl RelayServer {
    /// Bind and tune the listening socket.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        info!(%addr, "relay listening");

        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            inbox: Arc::new(MixInbox::new()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            next_client_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Request graceful shutdown: the accept loop stops, every client is
    /// retired, and `run` returns once all tasks have finished.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the mixer and the accept loop until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.tasks.spawn(mixer::run(
            Arc::clone(&self.registry),
            Arc::clone(&self.inbox),
            self.shutdown.clone(),
        ));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr),
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
        }

        info!(clients = self.registry.len(), "shutting down");
        for entry in self.registry.snapshot() {
            self.retire(&entry);
        }
        self.tasks.close();
        self.tasks.wait().await;
        info!("relay stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Connection handling
    // -----------------------------------------------------------------------

    fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%addr, "failed to disable Nagle: {e}");
        }

        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ClientEntry::new(id, self.shutdown.child_token()));
        self.registry.insert(Arc::clone(&entry));
        info!(%id, %addr, "client connected");

        let (read_half, write_half) = stream.into_split();

        let server = Arc::clone(self);
        let reader_entry = Arc::clone(&entry);
        self.tasks.spawn(async move {
            server.reader_loop(reader_entry, read_half).await;
        });

        let server = Arc::clone(self);
        self.tasks.spawn(async move {
            server.sender_loop(entry, write_half).await;
        });
    }

    /// Ingress: decode frames off the socket and deposit them in the inbox.
    async fn reader_loop(&self, entry: Arc<ClientEntry>, mut read_half: OwnedReadHalf) {
        loop {
            tokio::select! {
                _ = entry.cancelled() => break,
                read = read_frame(&mut read_half) => match read {
                    Ok(frame) => self.inbox.deposit(frame),
                    Err(e) => {
                        debug!(id = %entry.id, "ingress ended: {e}");
                        break;
                    }
                }
            }
        }
        self.retire(&entry);
    }

    /// Egress: drain the entry's queue onto the socket, FIFO.
    async fn sender_loop(&self, entry: Arc<ClientEntry>, mut write_half: OwnedWriteHalf) {
        loop {
            // Arm the wake before checking state so a notify landing between
            // an empty pop and the await is not lost.
            let wake = entry.notified();

            if !entry.is_active() {
                break;
            }

            let Some(frame) = entry.pop_frame() else {
                tokio::select! {
                    _ = entry.cancelled() => break,
                    _ = wake => {}
                }
                continue;
            };

            tokio::select! {
                _ = entry.cancelled() => break,
                written = write_frame(&mut write_half, &frame) => {
                    if let Err(e) = written {
                        debug!(id = %entry.id, "egress ended: {e}");
                        break;
                    }
                }
            }
        }
        let _ = write_half.shutdown().await;
        self.retire(&entry);
    }

    /// Idempotent teardown, callable from the reader, the sender, or the
    /// shutdown path. The single caller that wins the active-flag flip
    /// unblocks both tasks, empties the queue, and unlinks the entry;
    /// everyone else is a no-op.
    fn retire(&self, entry: &Arc<ClientEntry>) {
        if !entry.deactivate() {
            return;
        }
        entry.cancel();
        entry.clear_queue();
        entry.wake_sender();
        self.registry.unlink(entry.id);
        info!(id = %entry.id, "client removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::{FRAME_BYTES, FRAME_MILLIS, FRAME_SAMPLES, SEND_QUEUE_FRAMES};
    use bytes::{BufMut, Bytes, BytesMut};
    use std::time::Duration;
    use tokio::time::timeout;

    const READ_TIMEOUT: Duration = Duration::from_millis(500);

    async fn start_relay() -> (
        Arc<RelayServer>,
        SocketAddr,
        tokio::task::JoinHandle<anyhow::Result<()>>,
    ) {
        let server = Arc::new(
            RelayServer::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap(),
        );
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(Arc::clone(&server).run());
        (server, addr, handle)
    }

    fn frame_of(value: i16) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_BYTES);
        for _ in 0..FRAME_SAMPLES {
            buf.put_i16_le(value);
        }
        buf.freeze()
    }

    async fn next_frame(stream: &mut TcpStream) -> Bytes {
        timeout(READ_TIMEOUT, read_frame(stream))
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed")
    }

    async fn stop(server: Arc<RelayServer>, handle: tokio::task::JoinHandle<anyhow::Result<()>>) {
        server.request_shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn single_client_gets_its_own_frames_back() {
        let (server, addr, handle) = start_relay().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        write_frame(&mut client, &frame_of(0)).await.unwrap();
        assert_eq!(next_frame(&mut client).await, frame_of(0));

        write_frame(&mut client, &frame_of(1000)).await.unwrap();
        assert_eq!(next_frame(&mut client).await, frame_of(1000));

        stop(server, handle).await;
    }

    #[tokio::test]
    async fn concurrent_speakers_saturate_the_mix() {
        let (server, addr, handle) = start_relay().await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        // Back-to-back sends land in the same mix tick almost every round;
        // pacing at the mix cadence keeps one frame per client per tick.
        for _ in 0..20 {
            write_frame(&mut a, &frame_of(20_000)).await.unwrap();
            write_frame(&mut b, &frame_of(20_000)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(FRAME_MILLIS)).await;
        }

        let saturated = frame_of(i16::MAX);
        let mut seen = false;
        for _ in 0..60 {
            match timeout(READ_TIMEOUT, read_frame(&mut a)).await {
                Ok(Ok(frame)) => {
                    if frame == saturated {
                        seen = true;
                        break;
                    }
                }
                _ => break,
            }
        }
        assert!(seen, "no saturated frame observed");

        stop(server, handle).await;
    }

    #[tokio::test]
    async fn opposite_speakers_cancel_in_the_mix() {
        let (server, addr, handle) = start_relay().await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        for _ in 0..20 {
            write_frame(&mut a, &frame_of(10_000)).await.unwrap();
            write_frame(&mut b, &frame_of(-10_000)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(FRAME_MILLIS)).await;
        }

        let silence = frame_of(0);
        let mut seen = false;
        for _ in 0..60 {
            match timeout(READ_TIMEOUT, read_frame(&mut a)).await {
                Ok(Ok(frame)) => {
                    if frame == silence {
                        seen = true;
                        break;
                    }
                }
                _ => break,
            }
        }
        assert!(seen, "no cancelled frame observed");

        stop(server, handle).await;
    }

    #[tokio::test]
    async fn slow_consumer_queue_stays_bounded() {
        let (server, addr, handle) = start_relay().await;

        let fast = TcpStream::connect(addr).await.unwrap();
        let _slow = TcpStream::connect(addr).await.unwrap(); // never reads

        let (mut fast_rd, mut fast_wr) = fast.into_split();
        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        let reader = tokio::spawn(async move {
            while read_frame(&mut fast_rd).await.is_ok() {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        for i in 0..150u32 {
            write_frame(&mut fast_wr, &frame_of(100)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            if i % 10 == 0 {
                for entry in server.registry.snapshot() {
                    assert!(entry.queue_len() <= SEND_QUEUE_FRAMES);
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        for entry in server.registry.snapshot() {
            assert!(entry.queue_len() <= SEND_QUEUE_FRAMES);
        }
        assert!(
            received.load(Ordering::Relaxed) > 20,
            "fast client starved: {} frames",
            received.load(Ordering::Relaxed)
        );

        stop(server, handle).await;
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_removes_entry_without_disturbing_others() {
        let (server, addr, handle) = start_relay().await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        write_frame(&mut a, &frame_of(5)).await.unwrap();
        write_frame(&mut b, &frame_of(5)).await.unwrap();
        let _ = next_frame(&mut b).await;

        drop(a);
        let mut removed = false;
        for _ in 0..100 {
            if server.registry.len() == 1 {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(removed, "disconnected entry was not removed");

        // The survivor keeps flowing.
        write_frame(&mut b, &frame_of(42)).await.unwrap();
        let mut survived = false;
        for _ in 0..10 {
            if next_frame(&mut b).await == frame_of(42) {
                survived = true;
                break;
            }
        }
        assert!(survived);

        stop(server, handle).await;
    }

    #[tokio::test]
    async fn retire_is_idempotent() {
        let (server, addr, handle) = start_relay().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut client, &frame_of(1)).await.unwrap();

        let mut admitted = false;
        for _ in 0..100 {
            if server.registry.len() == 1 {
                admitted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(admitted);

        let entry = server.registry.snapshot().pop().unwrap();
        server.retire(&entry);
        assert!(!entry.is_active());
        assert!(server.registry.is_empty());
        assert_eq!(entry.queue_len(), 0);

        server.retire(&entry);
        assert!(server.registry.is_empty());

        stop(server, handle).await;
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_clients() {
        let (server, addr, handle) = start_relay().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut client, &frame_of(7)).await.unwrap();
        let _ = next_frame(&mut client).await;

        stop(server, handle).await;

        let mut closed = false;
        for _ in 0..10 {
            match timeout(READ_TIMEOUT, read_frame(&mut client)).await {
                Ok(Ok(_)) => continue, // a frame still in flight
                Ok(Err(_)) | Err(_) => {
                    closed = true;
                    break;
                }
            }
        }
        assert!(closed, "client socket still open after shutdown");
    }
}
