//! Nearest-neighbour decimation to the session input rate
//!
//! No anti-alias filter is applied. Speech intelligibility survives and the
//! per-frame cost stays a single indexed copy.

use std::borrow::Cow;

/// Sample rate expected by the realtime service for input audio
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Downsample `input` from `source_rate` to `target_rate`
///
/// Equal rates return the input borrowed. Output length is
/// `ceil(len / ratio)` and sample `i` is taken from `floor(i * ratio)`;
/// indices past the end of the input yield silence.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn downsample(input: &[f32], source_rate: u32, target_rate: u32) -> Cow<'_, [f32]> {
    if source_rate == target_rate || target_rate == 0 {
        return Cow::Borrowed(input);
    }

    let ratio = f64::from(source_rate) / f64::from(target_rate);
    let out_len = (input.len() as f64 / ratio).ceil() as usize;

    let output = (0..out_len)
        .map(|i| {
            let offset = (i as f64 * ratio).floor() as usize;
            input.get(offset).copied().unwrap_or(0.0)
        })
        .collect();

    Cow::Owned(output)
}

/// Down-mix interleaved multi-channel audio to mono by averaging channels
#[must_use]
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = usize::from(channels);
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / f32::from(channels))
        .collect()
}
