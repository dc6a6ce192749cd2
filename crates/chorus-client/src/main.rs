//! Console client: capture the microphone, stream to the relay, play the
//! mix back. `chorus-client test` swaps in a silent frame generator and a
//! discard sink so many instances can share one machine.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chorus_core::adapters::audio::{
    CpalAudioCapture, CpalAudioPlayback, DiscardPlayback, SilenceCapture,
};
use chorus_core::adapters::tcp::client::TcpFrameTransport;
use chorus_core::adapters::tcp::server::RELAY_PORT;
use chorus_core::application::ports::{AudioCapture, AudioPlayback, FrameTransport};
use chorus_core::application::receive_frames::ReceiveFramesUseCase;
use chorus_core::application::send_frames::SendFramesUseCase;

/// Relay host to dial. Change this to point at a remote server.
const RELAY_HOST: &str = "127.0.0.1";

#[derive(PartialEq)]
enum ClientMode {
    Normal,
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mode = if std::env::args().nth(1).as_deref() == Some("test") {
        ClientMode::Test
    } else {
        ClientMode::Normal
    };

    println!("// ─────────────────────────────────────────");
    println!("// chorus voice client — uncompressed voice conferencing");
    println!("//   format: PCM, 2 ch, 48000 Hz, 16-bit");
    println!("//   server: {RELAY_HOST}:{RELAY_PORT}");
    println!("// ─────────────────────────────────────────");
    if mode == ClientMode::Test {
        println!("test mode: sending silence, discarding received audio");
    }

    let addr: std::net::SocketAddr = format!("{RELAY_HOST}:{RELAY_PORT}").parse()?;
    let transport = TcpFrameTransport::connect(addr).await?;

    let mut capture: Box<dyn AudioCapture> = match mode {
        ClientMode::Test => Box::new(SilenceCapture),
        ClientMode::Normal => Box::new(CpalAudioCapture::new()?),
    };
    let playback: Arc<dyn AudioPlayback> = match mode {
        ClientMode::Test => Arc::new(DiscardPlayback),
        ClientMode::Normal => Arc::new(CpalAudioPlayback::new()?),
    };

    let sender = SendFramesUseCase::new(transport.clone() as Arc<dyn FrameTransport>);
    let send_task = tokio::spawn(async move {
        if let Err(e) = sender.run(capture.as_mut()).await {
            info!("send loop ended: {e}");
        }
    });

    let receiver = ReceiveFramesUseCase::new(transport.clone() as Arc<dyn FrameTransport>, playback);
    let recv_task = tokio::spawn(async move {
        if let Err(e) = receiver.run().await {
            info!("receive loop ended: {e}");
        }
    });

    println!("voice client running — press Enter to quit");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    transport.close();
    let _ = send_task.await;
    let _ = recv_task.await;
    info!("client stopped");
    Ok(())
}
