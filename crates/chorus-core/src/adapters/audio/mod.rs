//! Audio device adapters (client side): cpal capture and playback, plus the
//! synthetic sources used by test mode.

mod capture;
mod playback;

pub use capture::{CpalAudioCapture, SilenceCapture};
pub use playback::{CpalAudioPlayback, DiscardPlayback};

/// Resample interleaved stereo f32 samples from `from_rate` to `to_rate`
/// using per-channel linear interpolation. Good enough for voice in 20 ms
/// chunks.
fn resample_stereo(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let in_frames = input.len() / 2;
    let out_frames = ((in_frames as u64 * to_rate as u64) / from_rate as u64) as usize;
    let ratio = from_rate as f64 / to_rate as f64;
    let mut output = Vec::with_capacity(out_frames * 2);

    for i in 0..out_frames {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        for ch in 0..2 {
            let a = input.get(idx * 2 + ch).copied().unwrap_or(0.0);
            let b = input.get((idx + 1) * 2 + ch).copied().unwrap_or(a);
            output.push(a + (b - a) * frac);
        }
    }

    output
}
