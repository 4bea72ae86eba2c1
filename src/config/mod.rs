//! Configuration management
//!
//! Precedence: defaults, then the TOML file, then environment variables.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

pub use file::{LiveConfigFile, config_file_path, load_config_file, read_config_file};

use crate::session::gemini::DEFAULT_ENDPOINT;
use crate::voice::pipeline::{CHUNK_SAMPLES, SILENCE_EPSILON};
use crate::voice::wake_word::ENERGY_THRESHOLD;
use crate::voice::{PLAYBACK_SAMPLE_RATE, TARGET_SAMPLE_RATE};
use crate::{Error, Result};

/// Default realtime model
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Puck";

/// Default wake phrase
pub const DEFAULT_WAKE_WORD: &str = "hey beacon";

/// Default system instruction
pub const DEFAULT_INSTRUCTIONS: &str = "You are Beacon, a concise voice assistant running on the \
user's computer. Answer in short spoken sentences. Use the available tools to open websites, \
search the web, switch the interface theme and report system status.";

/// Realtime session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint
    pub endpoint: String,
    /// Model resource name
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// System instruction
    pub instructions: String,
    /// Request input/output transcription
    pub transcription: bool,
    /// Rate audio is sent at
    pub input_sample_rate: u32,
    /// Output device rate
    pub output_sample_rate: u32,
    /// Samples per transmitted chunk
    pub chunk_samples: usize,
    /// Silence gate RMS floor
    pub silence_epsilon: f32,
    /// Delay before the one automatic reconnect
    pub reconnect_backoff: Duration,
    /// Delay before the wake word gate restarts after a session ends
    pub wake_word_restart_delay: Duration,
    /// Interval between shared screen frames
    pub screen_frame_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            transcription: true,
            input_sample_rate: TARGET_SAMPLE_RATE,
            output_sample_rate: PLAYBACK_SAMPLE_RATE,
            chunk_samples: CHUNK_SAMPLES,
            silence_epsilon: SILENCE_EPSILON,
            reconnect_backoff: Duration::from_secs(2),
            wake_word_restart_delay: Duration::from_secs(1),
            screen_frame_interval: Duration::from_secs(1),
        }
    }
}

/// Wake word gate configuration
#[derive(Debug)]
pub struct WakeWordConfig {
    /// Detector credential; the gate is disabled without it
    pub access_key: Option<SecretString>,
    /// Phrase announced to the user
    pub keyword: String,
    /// RMS speech threshold
    pub threshold: f32,
    /// Explicit on/off switch
    pub enabled: bool,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            keyword: DEFAULT_WAKE_WORD.to_string(),
            threshold: ENERGY_THRESHOLD,
            enabled: true,
        }
    }
}

impl WakeWordConfig {
    /// Whether the gate should run
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.access_key.is_some()
    }
}

/// Beacon Live configuration
#[derive(Debug, Default)]
pub struct Config {
    /// Realtime service credential
    pub api_key: Option<SecretString>,
    /// Session tunables
    pub session: SessionConfig,
    /// Wake word gate
    pub wake_word: WakeWordConfig,
    /// Input device name; system default when `None`
    pub input_device: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

impl Config {
    /// Load configuration from the default file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if the merged configuration is invalid
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = config_file_path(env);
        let file = load_config_file(path.as_deref());
        Self::from_sources(file, env)
    }

    /// Merge defaults, `file` and the variables visible through `env`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a tunable is out of range
    pub fn from_sources(file: LiveConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SessionConfig::default();
        let var = |key: &str| non_empty(env(key));

        let api_key = var("GEMINI_API_KEY")
            .or_else(|| var("BEACON_LIVE_API_KEY"))
            .or(non_empty(file.api_keys.gemini))
            .map(SecretString::from);

        let session = SessionConfig {
            endpoint: var("BEACON_LIVE_ENDPOINT")
                .or(file.session.endpoint)
                .unwrap_or(defaults.endpoint),
            model: var("BEACON_LIVE_MODEL")
                .or(file.session.model)
                .unwrap_or(defaults.model),
            voice: var("BEACON_LIVE_VOICE")
                .or(file.session.voice)
                .unwrap_or(defaults.voice),
            instructions: var("BEACON_LIVE_INSTRUCTIONS")
                .or(file.session.instructions)
                .unwrap_or(defaults.instructions),
            transcription: file.session.transcription.unwrap_or(defaults.transcription),
            input_sample_rate: file
                .audio
                .input_sample_rate
                .unwrap_or(defaults.input_sample_rate),
            output_sample_rate: file
                .audio
                .output_sample_rate
                .unwrap_or(defaults.output_sample_rate),
            chunk_samples: file.audio.chunk_samples.unwrap_or(defaults.chunk_samples),
            silence_epsilon: file.audio.silence_epsilon.unwrap_or(defaults.silence_epsilon),
            reconnect_backoff: millis(file.session.reconnect_backoff_ms, defaults.reconnect_backoff),
            wake_word_restart_delay: millis(
                file.session.wake_word_restart_delay_ms,
                defaults.wake_word_restart_delay,
            ),
            screen_frame_interval: millis(
                file.session.screen_frame_interval_ms,
                defaults.screen_frame_interval,
            ),
        };

        let wake_word = WakeWordConfig {
            access_key: var("BEACON_LIVE_WAKE_WORD_KEY")
                .or(non_empty(file.api_keys.wake_word))
                .map(SecretString::from),
            keyword: var("BEACON_LIVE_WAKE_WORD")
                .or(file.wake_word.keyword)
                .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string()),
            threshold: file.wake_word.threshold.unwrap_or(ENERGY_THRESHOLD),
            enabled: file.wake_word.enabled.unwrap_or(true),
        };

        let config = Self {
            api_key,
            session,
            wake_word,
            input_device: file.audio.input_device,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check tunables are usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first bad value
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.chunk_samples == 0 {
            return Err(Error::Config("audio.chunk_samples must be positive".to_string()));
        }
        if s.input_sample_rate == 0 || s.output_sample_rate == 0 {
            return Err(Error::Config("audio sample rates must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&s.silence_epsilon) {
            return Err(Error::Config(
                "audio.silence_epsilon must be in [0, 1)".to_string(),
            ));
        }
        if s.screen_frame_interval.is_zero() {
            return Err(Error::Config(
                "session.screen_frame_interval_ms must be positive".to_string(),
            ));
        }
        if !(self.wake_word.threshold > 0.0 && self.wake_word.threshold < 1.0) {
            return Err(Error::Config(
                "wake_word.threshold must be in (0, 1)".to_string(),
            ));
        }
        if !s.endpoint.starts_with("ws://") && !s.endpoint.starts_with("wss://") {
            return Err(Error::Config(format!(
                "session endpoint must be a ws:// or wss:// url: {}",
                s.endpoint
            )));
        }
        Ok(())
    }

    /// Whether a realtime service credential is configured
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}
