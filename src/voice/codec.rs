//! PCM16 and base64 transcoding for the realtime wire format

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Encode bytes as standard padded base64
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode standard padded base64
///
/// # Errors
///
/// Returns error if the input is not valid base64
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    B64.decode(data)
        .map_err(|e| Error::Decode(format!("invalid base64: {e}")))
}

/// Convert f32 samples in [-1, 1] to little-endian PCM16 bytes
///
/// Negative samples scale by 32768, non-negative by 32767, so both ends of
/// the range map exactly onto `i16::MIN` and `i16::MAX`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        bytes.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    bytes
}

/// Decoded multichannel audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a mono buffer
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map_or(&[], Vec::as_slice)
    }

    /// Frames per channel
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Convert little-endian PCM16 bytes into a float buffer
///
/// Interleaved frames are split per channel. An odd byte count is padded with
/// a zero byte so the trailing half-sample survives at reduced precision.
#[must_use]
pub fn pcm16_to_float(bytes: &[u8], sample_rate: u32, channel_count: u16) -> AudioBuffer {
    let channel_count = usize::from(channel_count.max(1));

    let mut padded;
    let bytes = if bytes.len() % 2 == 1 {
        padded = bytes.to_vec();
        padded.push(0);
        padded.as_slice()
    } else {
        bytes
    };

    let total = bytes.len() / 2;
    let frames = total / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];

    for (i, pair) in bytes.chunks_exact(2).take(frames * channel_count).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        channels[i % channel_count].push(f32::from(value) / 32768.0);
    }

    AudioBuffer {
        sample_rate,
        channels,
    }
}

/// Base64 media payload with its MIME descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

impl MediaBlob {
    /// Package f32 samples as PCM16 at the given input rate
    #[must_use]
    pub fn pcm(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            data: encode_base64(&float_to_pcm16(samples)),
        }
    }

    /// Package an encoded screen frame
    #[must_use]
    pub fn jpeg(bytes: &[u8]) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: encode_base64(bytes),
        }
    }
}

/// Parse the sample rate from a MIME descriptor such as `audio/pcm;rate=24000`
#[must_use]
pub fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|part| part.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}
