//! Audio frame format and PCM mixing (pure data — no I/O).
//!
//! Everything on the wire is uncompressed PCM: interleaved 16-bit
//! little-endian samples, 2 channels, 48 kHz. One canonical frame carries
//! 20 ms of audio.

use bytes::{BufMut, Bytes, BytesMut};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sample rate used throughout chorus (Hz).
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count (interleaved L,R).
pub const CHANNELS: usize = 2;

/// Duration of one frame in milliseconds.
pub const FRAME_MILLIS: u64 = 20;

/// Total 16-bit samples in a canonical frame, both channels interleaved.
/// 48 kHz / 50 frames per second × 2 channels.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 50) * CHANNELS; // 1920

/// Canonical frame size in bytes.
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2; // 3840

/// Per-client send queue capacity. 50 frames of 20 ms ≈ 1 s of audio; a
/// consumer that falls further behind starts losing the oldest frames.
pub const SEND_QUEUE_FRAMES: usize = 50;

static SILENCE: [u8; FRAME_BYTES] = [0u8; FRAME_BYTES];

/// A canonical frame of silence. Cheap to clone (static storage).
pub fn silent_frame() -> Bytes {
    Bytes::from_static(&SILENCE)
}

// ---------------------------------------------------------------------------
// Mixing
// ---------------------------------------------------------------------------

/// Mix any number of PCM frames into one canonical frame.
///
/// Accumulates per-sample with saturating 16-bit addition, processing whole
/// frames in slice order. Inputs shorter than the canonical size contribute
/// only their available samples; longer inputs are truncated. The output is
/// always [`FRAME_BYTES`] long, silence when `inputs` is empty.
pub fn mix_frames(inputs: &[Bytes]) -> Bytes {
    let mut acc = vec![0i16; FRAME_SAMPLES];

    for input in inputs {
        let samples = (input.len() / 2).min(FRAME_SAMPLES);
        for i in 0..samples {
            let s = i16::from_le_bytes([input[2 * i], input[2 * i + 1]]);
            acc[i] = acc[i].saturating_add(s);
        }
    }

    let mut out = BytesMut::with_capacity(FRAME_BYTES);
    for &s in &acc {
        out.put_i16_le(s);
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a frame of `samples` identical 16-bit values.
    fn frame_of(value: i16, samples: usize) -> Bytes {
        let mut buf = BytesMut::with_capacity(samples * 2);
        for _ in 0..samples {
            buf.put_i16_le(value);
        }
        buf.freeze()
    }

    fn samples_of(frame: &Bytes) -> Vec<i16> {
        frame
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn no_inputs_mix_to_silence() {
        let out = mix_frames(&[]);
        assert_eq!(out.len(), FRAME_BYTES);
        assert!(samples_of(&out).iter().all(|&s| s == 0));
    }

    #[test]
    fn single_frame_is_identity() {
        let frame = frame_of(1000, FRAME_SAMPLES);
        let out = mix_frames(std::slice::from_ref(&frame));
        assert_eq!(out, frame);
    }

    #[test]
    fn two_frames_sum_per_sample() {
        let a = frame_of(1000, FRAME_SAMPLES);
        let b = frame_of(2500, FRAME_SAMPLES);
        let out = mix_frames(&[a.clone(), b.clone()]);
        assert!(samples_of(&out).iter().all(|&s| s == 3500));

        // Commutative: order of contributors does not change the result.
        let reversed = mix_frames(&[b, a]);
        assert_eq!(out, reversed);
    }

    #[test]
    fn opposite_signs_cancel() {
        let a = frame_of(10_000, FRAME_SAMPLES);
        let b = frame_of(-10_000, FRAME_SAMPLES);
        let out = mix_frames(&[a, b]);
        assert!(samples_of(&out).iter().all(|&s| s == 0));
    }

    #[test]
    fn overflow_clamps_instead_of_wrapping() {
        let a = frame_of(20_000, FRAME_SAMPLES);
        let b = frame_of(20_000, FRAME_SAMPLES);
        let out = mix_frames(&[a, b]);
        assert!(samples_of(&out).iter().all(|&s| s == i16::MAX));

        let c = frame_of(-20_000, FRAME_SAMPLES);
        let d = frame_of(-20_000, FRAME_SAMPLES);
        let out = mix_frames(&[c, d]);
        assert!(samples_of(&out).iter().all(|&s| s == i16::MIN));
    }

    #[test]
    fn three_way_saturation_stays_in_range() {
        let inputs = vec![
            frame_of(30_000, FRAME_SAMPLES),
            frame_of(30_000, FRAME_SAMPLES),
            frame_of(-30_000, FRAME_SAMPLES),
        ];
        let out = mix_frames(&inputs);
        for s in samples_of(&out) {
            assert!((i16::MIN..=i16::MAX).contains(&s));
        }
    }

    #[test]
    fn short_input_contributes_only_its_samples() {
        let short = frame_of(500, 10);
        let full = frame_of(100, FRAME_SAMPLES);
        let out = mix_frames(&[short, full]);
        let samples = samples_of(&out);
        assert_eq!(out.len(), FRAME_BYTES);
        assert!(samples[..10].iter().all(|&s| s == 600));
        assert!(samples[10..].iter().all(|&s| s == 100));
    }

    #[test]
    fn long_input_is_truncated() {
        let long = frame_of(700, FRAME_SAMPLES + 64);
        let out = mix_frames(&[long]);
        assert_eq!(out.len(), FRAME_BYTES);
        assert!(samples_of(&out).iter().all(|&s| s == 700));
    }
}
