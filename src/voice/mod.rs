//! Voice processing module
//!
//! Handles audio capture, PCM transcoding, gapless playback and wake word
//! detection. The [`AudioPipeline`] ties capture and playback together for a
//! live session.

pub mod capture;
pub mod codec;
pub mod pipeline;
pub mod playback;
pub mod resample;
pub mod scheduler;
pub mod wake_word;

pub use capture::{CaptureHandle, CpalMicrophone, FrameSink, Microphone, list_input_devices, rms};
pub use codec::{AudioBuffer, MediaBlob};
pub use pipeline::{AudioChunk, AudioLevels, AudioPipeline, PipelineConfig};
pub use playback::{AudioOutput, CpalOutput, PLAYBACK_SAMPLE_RATE, PlaybackEnd};
pub use resample::TARGET_SAMPLE_RATE;
pub use scheduler::{PlaybackScheduler, PlaybackUnit};
pub use wake_word::{
    DetectionCallback, DetectorState, EnergyWakeDetector, GateContext, WakeWordEngine,
    WakeWordGate,
};
