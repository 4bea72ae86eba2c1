//! Live audio pipeline
//!
//! Capture side: resample, accumulate, slice into fixed chunks and drop the
//! near-silent ones. Playback side: decode received PCM and queue it
//! gaplessly on the output device.

use super::capture::{CaptureHandle, rms};
use super::codec::{AudioBuffer, MediaBlob, pcm16_to_float};
use super::playback::{AudioOutput, PlaybackEnd};
use super::resample::downsample;
use super::scheduler::{PlaybackScheduler, PlaybackUnit};
use crate::Result;

/// Samples per transmitted chunk at the input rate
pub const CHUNK_SAMPLES: usize = 4096;

/// Chunks at or below this RMS are treated as silence and not sent
pub const SILENCE_EPSILON: f32 = 1e-6;

/// Pipeline tunables
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Rate the service expects for input audio
    pub input_sample_rate: u32,
    /// Samples per chunk
    pub chunk_samples: usize,
    /// RMS noise floor
    pub silence_epsilon: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: super::resample::TARGET_SAMPLE_RATE,
            chunk_samples: CHUNK_SAMPLES,
            silence_epsilon: SILENCE_EPSILON,
        }
    }
}

/// One fixed-size run of resampled input audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Vec<f32>,
    rms: f32,
}

impl AudioChunk {
    /// Samples at the input rate
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Root-mean-square energy
    #[must_use]
    pub const fn rms(&self) -> f32 {
        self.rms
    }

    /// Encode for transmission, consuming the chunk
    #[must_use]
    pub fn into_blob(self, sample_rate: u32) -> MediaBlob {
        MediaBlob::pcm(&self.samples, sample_rate)
    }
}

/// Latest input/output levels, for visualization
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevels {
    /// RMS of the most recent capture frame
    pub input_rms: f32,
    /// Peak magnitude of the most recent capture frame
    pub input_peak: f32,
    /// RMS of the most recently scheduled playback buffer
    pub output_rms: f32,
    /// Peak magnitude of the most recently scheduled playback buffer
    pub output_peak: f32,
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Owns the capture graph, chunk accumulator and playback queue
pub struct AudioPipeline {
    config: PipelineConfig,
    accumulator: Vec<f32>,
    levels: AudioLevels,
    scheduler: PlaybackScheduler,
    output: Box<dyn AudioOutput>,
    capture: Option<Box<dyn CaptureHandle>>,
}

impl AudioPipeline {
    /// Create a pipeline that plays through `output`
    #[must_use]
    pub fn new(config: PipelineConfig, output: Box<dyn AudioOutput>) -> Self {
        Self {
            config,
            accumulator: Vec::with_capacity(config.chunk_samples * 2),
            levels: AudioLevels::default(),
            scheduler: PlaybackScheduler::new(),
            output,
            capture: None,
        }
    }

    /// Pipeline tunables
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Take ownership of a running capture subscription
    ///
    /// Any previous subscription is stopped first.
    pub fn attach_capture(&mut self, handle: Box<dyn CaptureHandle>) {
        if let Some(mut previous) = self.capture.replace(handle) {
            previous.stop();
        }
    }

    /// Whether a capture subscription is attached
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Feed one capture frame; returns the chunks ready for transmission
    pub fn push_capture_frame(&mut self, frame: &[f32], source_rate: u32) -> Vec<AudioChunk> {
        self.levels.input_rms = rms(frame);
        self.levels.input_peak = peak(frame);

        let resampled = downsample(frame, source_rate, self.config.input_sample_rate);
        self.accumulator.extend_from_slice(&resampled);

        let size = self.config.chunk_samples.max(1);
        let mut chunks = Vec::new();
        while self.accumulator.len() >= size {
            let samples: Vec<f32> = self.accumulator.drain(..size).collect();
            let energy = rms(&samples);
            if energy > self.config.silence_epsilon {
                chunks.push(AudioChunk {
                    samples,
                    rms: energy,
                });
            } else {
                tracing::trace!(rms = energy, "dropping silent chunk");
            }
        }
        chunks
    }

    /// Samples waiting for the next chunk boundary
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.accumulator.len()
    }

    /// Decode received PCM16 and queue it after everything already playing
    ///
    /// `on_end` receives the unit id once it finishes playing naturally.
    ///
    /// # Errors
    ///
    /// Returns error if the output device rejects the buffer; the unit is
    /// removed from the live set before returning.
    pub fn receive_audio(
        &mut self,
        bytes: &[u8],
        sample_rate: u32,
        channel_count: u16,
        on_end: impl FnOnce(u64) + Send + 'static,
    ) -> Result<PlaybackUnit> {
        let buffer = pcm16_to_float(bytes, sample_rate, channel_count);
        self.schedule_buffer(buffer, on_end)
    }

    /// Queue an already-decoded buffer
    ///
    /// # Errors
    ///
    /// Returns error if the output device rejects the buffer
    pub fn schedule_buffer(
        &mut self,
        buffer: AudioBuffer,
        on_end: impl FnOnce(u64) + Send + 'static,
    ) -> Result<PlaybackUnit> {
        self.levels.output_rms = rms(buffer.channel(0));
        self.levels.output_peak = peak(buffer.channel(0));

        let unit = self.scheduler.schedule(buffer.duration(), self.output.now());
        let id = unit.id;
        let notify: PlaybackEnd = Box::new(move || on_end(id));
        if let Err(e) = self.output.play(&unit, buffer, notify) {
            self.scheduler.complete(unit.id);
            return Err(e);
        }
        Ok(unit)
    }

    /// A unit ended naturally; returns `true` if nothing is left playing
    pub fn finish_unit(&mut self, id: u64) -> bool {
        self.scheduler.complete(id)
    }

    /// Stop all playback and rewind the timeline cursor
    pub fn interrupt(&mut self) {
        self.output.stop_all();
        self.scheduler.reset();
    }

    /// Whether anything is queued or playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// Playback scheduler state
    #[must_use]
    pub const fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Latest audio levels
    #[must_use]
    pub const fn levels(&self) -> AudioLevels {
        self.levels
    }

    /// Disconnect capture, stop playback and clear buffered input
    ///
    /// Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            tracing::debug!("capture detached");
        }
        self.output.stop_all();
        self.scheduler.reset();
        self.accumulator.clear();
        self.levels = AudioLevels::default();
    }
}
