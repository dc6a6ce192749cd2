//! Audio capture: cpal microphone input producing canonical 20 ms frames,
//! and the silent source used by test mode.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tracing::{info, warn};

use crate::application::ports::AudioCapture;
use crate::domain::frame::{silent_frame, FRAME_BYTES, FRAME_MILLIS, FRAME_SAMPLES, SAMPLE_RATE};

use super::resample_stereo;

// ---------------------------------------------------------------------------
// cpal capture
// ---------------------------------------------------------------------------

/// Real microphone capture.
///
/// The cpal input stream runs on its own OS thread. The callback converts
/// whatever the device produces (mono, multi-channel, any rate) to
/// interleaved stereo at the device's native sample rate and pushes it into
/// a ring buffer. [`AudioCapture::next_frame`] pulls 20 ms worth, resamples
/// to 48 kHz if necessary, and packs little-endian i16 samples.
pub struct CpalAudioCapture {
    /// Consumer side of the capture ring (interleaved stereo f32 at device
    /// rate).
    consumer: ringbuf::HeapCons<f32>,
    device_sample_rate: u32,
    /// Interleaved stereo values per 20 ms at the device rate.
    values_per_frame: usize,
    /// Keep the stream alive (dropped = stream stops).
    _stream: cpal::Stream,
}

// SAFETY: CpalAudioCapture is only ever accessed via `&mut self` and is
// moved into exactly one task; the non-Send inner types are never shared
// across threads.
unsafe impl Send for CpalAudioCapture {}

impl CpalAudioCapture {
    /// Open the default input device at its native format and start
    /// recording.
    pub fn new() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default audio input device found"))?;
        let dev_name = device.name().unwrap_or_default();

        let supported = device.default_input_config()?;
        let device_channels = supported.channels();
        let device_sample_rate = supported.sample_rate().0;

        info!(
            device = dev_name,
            channels = device_channels,
            sample_rate = device_sample_rate,
            "opening audio input device"
        );

        let config = cpal::StreamConfig {
            channels: device_channels,
            sample_rate: cpal::SampleRate(device_sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Ring sized for ~200 ms of stereo audio at the device rate.
        let ring_capacity = (device_sample_rate as usize) * 2 / 5;
        let ring = HeapRb::<f32>::new(ring_capacity.max(FRAME_SAMPLES * 4));
        let (mut producer, consumer) = ring.split();

        let ch = device_channels as usize;
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if ch == 1 {
                    // Mono — duplicate into both channels.
                    for &sample in data {
                        let _ = producer.try_push(sample);
                        let _ = producer.try_push(sample);
                    }
                } else {
                    // Keep the first two channels, drop the rest.
                    for group in data.chunks_exact(ch) {
                        let _ = producer.try_push(group[0]);
                        let _ = producer.try_push(group[1]);
                    }
                }
            },
            |err| {
                warn!("audio input stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        Ok(Self {
            consumer,
            device_sample_rate,
            values_per_frame: (device_sample_rate as usize / 50) * 2,
            _stream: stream,
        })
    }
}

#[async_trait]
impl AudioCapture for CpalAudioCapture {
    async fn next_frame(&mut self) -> anyhow::Result<Bytes> {
        // Wait until a full 20 ms of samples has accumulated.
        while self.consumer.occupied_len() < self.values_per_frame {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut device_pcm = vec![0.0f32; self.values_per_frame];
        self.consumer.pop_slice(&mut device_pcm);

        let pcm_48k = if self.device_sample_rate == SAMPLE_RATE {
            device_pcm
        } else {
            resample_stereo(&device_pcm, self.device_sample_rate, SAMPLE_RATE)
        };

        let mut out = BytesMut::with_capacity(FRAME_BYTES);
        for i in 0..FRAME_SAMPLES {
            let sample = pcm_48k.get(i).copied().unwrap_or(0.0);
            out.put_i16_le((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
        }
        Ok(out.freeze())
    }
}

// ---------------------------------------------------------------------------
// Silence source (test mode)
// ---------------------------------------------------------------------------

/// Synthetic capture source that emits one silent canonical frame every
/// 20 ms. Lets many clients run on one machine without fighting over the
/// microphone.
pub struct SilenceCapture;

#[async_trait]
impl AudioCapture for SilenceCapture {
    async fn next_frame(&mut self) -> anyhow::Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(FRAME_MILLIS)).await;
        Ok(silent_frame())
    }
}
