//! Audio playback: cpal speaker output fed by received mix frames, and the
//! discard sink used by test mode.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::Mutex;
use tracing::{info, trace, warn};

use crate::application::ports::AudioPlayback;
use crate::domain::frame::SAMPLE_RATE;

use super::resample_stereo;

// ---------------------------------------------------------------------------
// cpal playback
// ---------------------------------------------------------------------------

/// Real speaker playback.
///
/// Received frames are converted from i16 stereo 48 kHz to the output
/// device's native format and pushed into a ring buffer; the cpal output
/// callback drains it. A full ring costs samples, never blocks the caller.
pub struct CpalAudioPlayback {
    /// Producer side of the output ring (interleaved stereo f32 at device
    /// rate).
    producer: Mutex<ringbuf::HeapProd<f32>>,
    device_sample_rate: u32,
    /// Keep the output stream alive.
    _stream: cpal::Stream,
}

// SAFETY: the producer is behind a Mutex and cpal::Stream is only kept
// alive, never touched after construction.
unsafe impl Send for CpalAudioPlayback {}
unsafe impl Sync for CpalAudioPlayback {}

impl CpalAudioPlayback {
    /// Open the default output device at its native format.
    pub fn new() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default audio output device found"))?;
        let dev_name = device.name().unwrap_or_default();

        let supported = device.default_output_config()?;
        let device_channels = supported.channels();
        let device_sample_rate = supported.sample_rate().0;

        info!(
            device = dev_name,
            channels = device_channels,
            sample_rate = device_sample_rate,
            "opening audio output device"
        );

        let config = cpal::StreamConfig {
            channels: device_channels,
            sample_rate: cpal::SampleRate(device_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // ~200 ms of stereo headroom absorbs scheduler jitter.
        let ring_capacity = (device_sample_rate as usize) * 2 / 5;
        let ring = HeapRb::<f32>::new(ring_capacity.max(9600));
        let (producer, mut consumer) = ring.split();

        let ch = device_channels as usize;
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                data.fill(0.0);
                if ch == 1 {
                    for slot in data.iter_mut() {
                        let left = consumer.try_pop().unwrap_or(0.0);
                        let right = consumer.try_pop().unwrap_or(0.0);
                        *slot = (left + right) * 0.5;
                    }
                } else {
                    for group in data.chunks_exact_mut(ch) {
                        group[0] = consumer.try_pop().unwrap_or(0.0);
                        group[1] = consumer.try_pop().unwrap_or(0.0);
                    }
                }
            },
            |err| {
                warn!("audio output stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        Ok(Self {
            producer: Mutex::new(producer),
            device_sample_rate,
            _stream: stream,
        })
    }
}

#[async_trait]
impl AudioPlayback for CpalAudioPlayback {
    async fn play_frame(&self, frame: &[u8]) -> anyhow::Result<()> {
        let pcm_48k: Vec<f32> = frame
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect();

        let samples = if self.device_sample_rate == SAMPLE_RATE {
            pcm_48k
        } else {
            resample_stereo(&pcm_48k, SAMPLE_RATE, self.device_sample_rate)
        };

        let mut producer = self.producer.lock().await;
        let written = producer.push_slice(&samples);
        if written < samples.len() {
            trace!(dropped = samples.len() - written, "output ring full");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Discard sink (test mode)
// ---------------------------------------------------------------------------

/// Playback sink that throws frames away. Used by test-mode clients so they
/// never open an output device.
pub struct DiscardPlayback;

#[async_trait]
impl AudioPlayback for DiscardPlayback {
    async fn play_frame(&self, _frame: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}
