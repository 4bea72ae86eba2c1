//! Wake word gate
//!
//! A background listener that starts a session on detection. The gate and an
//! active session are mutually exclusive: it only runs while the client is
//! idle and is torn down before every connect attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::capture::{CaptureHandle, FrameSink, Microphone, rms};
use super::resample::{TARGET_SAMPLE_RATE, downsample};
use crate::Result;
use crate::session::SessionStatus;

/// Called by an engine when the keyword is heard
pub type DetectionCallback = Arc<dyn Fn() + Send + Sync>;

/// Black-box keyword spotter
pub trait WakeWordEngine: Send {
    /// Begin listening; `on_detect` may be called from any thread
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot start
    fn start(&mut self, on_detect: DetectionCallback) -> Result<()>;

    /// Terminate the engine and release its audio subscription
    fn stop(&mut self);
}

/// Session facts the gate checks before starting
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    /// Current session status
    pub status: SessionStatus,
    /// Whether a session handle exists
    pub has_session: bool,
    /// Whether a connect attempt is in flight
    pub connecting: bool,
}

/// Listening / not-listening wrapper around an optional engine
pub struct WakeWordGate {
    engine: Option<Box<dyn WakeWordEngine>>,
    listening: bool,
}

impl WakeWordGate {
    /// Gate driven by `engine`; `None` disables the gate permanently
    #[must_use]
    pub fn new(engine: Option<Box<dyn WakeWordEngine>>) -> Self {
        Self {
            engine,
            listening: false,
        }
    }

    /// Whether an engine is configured
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether the engine is currently running
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Start listening if the session is fully idle
    ///
    /// Returns `true` if the gate is listening afterwards.
    pub fn try_start(&mut self, ctx: GateContext, on_detect: DetectionCallback) -> bool {
        if self.listening {
            return true;
        }
        if ctx.status != SessionStatus::Idle || ctx.has_session || ctx.connecting {
            tracing::debug!(status = %ctx.status, "wake word gate not started, session active");
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };

        match engine.start(on_detect) {
            Ok(()) => {
                self.listening = true;
                tracing::info!("wake word gate listening");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "wake word engine failed to start");
                false
            }
        }
    }

    /// Stop the engine. Idempotent.
    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.listening = false;
        tracing::debug!("wake word gate stopped");
    }
}

/// Minimum audio energy threshold to consider speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the speech-onset spotter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Energy-based spotter: fires when a spoken phrase ends
#[derive(Debug)]
pub struct OnsetDetector {
    threshold: f32,
    state: DetectorState,
    speech_samples: usize,
    silence_counter: usize,
}

impl OnsetDetector {
    /// Create a detector with the given RMS speech threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: DetectorState::Idle,
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Process 16 kHz samples; returns `true` when a phrase completes
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.speech_samples, "speech segment complete");
                    self.reset();
                    return true;
                }

                // Timeout: too much silence without enough speech
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
        }

        false
    }

    /// Reset detector to idle state
    pub const fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// One engine run: its capture handle and cancellation flag
#[derive(Default)]
struct Subscription {
    cancelled: AtomicBool,
    fired: AtomicBool,
    capture: Mutex<Option<Box<dyn CaptureHandle>>>,
}

impl Subscription {
    fn release(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Ok(mut slot) = self.capture.lock()
            && let Some(mut capture) = slot.take()
        {
            capture.stop();
        }
    }
}

/// Local wake engine built on its own microphone subscription
///
/// This is a speech-onset trigger standing in for a keyword spotter: any
/// phrase of roughly 0.3 s followed by silence fires it. The configured
/// keyword is only what the user is told to say; it plays no part in
/// detection.
pub struct EnergyWakeDetector {
    microphone: Arc<dyn Microphone>,
    keyword: String,
    threshold: f32,
    active: Option<Arc<Subscription>>,
}

impl EnergyWakeDetector {
    /// Create an engine listening through `microphone`
    #[must_use]
    pub fn new(microphone: Arc<dyn Microphone>, keyword: &str, threshold: f32) -> Self {
        Self {
            microphone,
            keyword: keyword.trim().to_lowercase(),
            threshold,
            active: None,
        }
    }

    /// Normalized keyword announced to the user; not matched against audio
    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }
}

impl WakeWordEngine for EnergyWakeDetector {
    fn start(&mut self, on_detect: DetectionCallback) -> Result<()> {
        self.stop();

        let subscription = Arc::new(Subscription::default());
        let detector = Arc::new(Mutex::new(OnsetDetector::new(self.threshold)));

        let sink_sub = Arc::clone(&subscription);
        let sink: FrameSink = Arc::new(move |frame, rate| {
            if sink_sub.cancelled.load(Ordering::Acquire) {
                return;
            }
            let samples = downsample(&frame, rate, TARGET_SAMPLE_RATE);
            let complete = detector.lock().is_ok_and(|mut d| d.process(&samples));
            if complete && !sink_sub.fired.swap(true, Ordering::AcqRel) {
                on_detect();
            }
        });

        let microphone = Arc::clone(&self.microphone);
        let task_sub = Arc::clone(&subscription);
        tokio::spawn(async move {
            match microphone.open(sink).await {
                Ok(mut capture) => {
                    // Checked under the lock so a concurrent release cannot miss it
                    let Ok(mut slot) = task_sub.capture.lock() else {
                        capture.stop();
                        return;
                    };
                    if task_sub.cancelled.load(Ordering::Acquire) {
                        drop(slot);
                        capture.stop();
                    } else {
                        *slot = Some(capture);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "wake word microphone unavailable"),
            }
        });

        tracing::info!(keyword = %self.keyword, "listening for wake word");
        self.active = Some(subscription);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(subscription) = self.active.take() {
            subscription.release();
        }
    }
}

impl Drop for EnergyWakeDetector {
    fn drop(&mut self) {
        self.stop();
    }
}
