//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-live/config.toml` (or `$BEACON_LIVE_CONFIG`)
//! as a persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveConfigFile {
    /// Realtime session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake word gate configuration
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    /// Credentials
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Realtime session configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionFileConfig {
    /// WebSocket endpoint
    pub endpoint: Option<String>,
    /// Model resource name (e.g. "models/gemini-2.0-flash-exp")
    pub model: Option<String>,
    /// Prebuilt voice name (e.g. "Puck")
    pub voice: Option<String>,
    /// System instruction
    pub instructions: Option<String>,
    /// Ask the service for input/output transcriptions
    pub transcription: Option<bool>,
    /// Delay before the automatic reconnect, in milliseconds
    pub reconnect_backoff_ms: Option<u64>,
    /// Delay before the wake word gate restarts, in milliseconds
    pub wake_word_restart_delay_ms: Option<u64>,
    /// Interval between shared screen frames, in milliseconds
    pub screen_frame_interval_ms: Option<u64>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioFileConfig {
    /// Rate sent to the service
    pub input_sample_rate: Option<u32>,
    /// Output device rate
    pub output_sample_rate: Option<u32>,
    /// Samples per transmitted chunk
    pub chunk_samples: Option<usize>,
    /// RMS below which a chunk is not sent
    pub silence_epsilon: Option<f32>,
    /// Input device name
    pub input_device: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WakeWordFileConfig {
    /// Disable the gate even when a detector key is present
    pub enabled: Option<bool>,
    /// Phrase announced to the user
    pub keyword: Option<String>,
    /// RMS speech threshold
    pub threshold: Option<f32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub wake_word: Option<String>,
}

/// Parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read, is not valid TOML, or names
/// a key no section knows
pub fn read_config_file(path: &Path) -> Result<LiveConfigFile> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Load the TOML config file from `path`
///
/// Returns `LiveConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> LiveConfigFile {
    let Some(path) = path else {
        return LiveConfigFile::default();
    };

    if !path.exists() {
        return LiveConfigFile::default();
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            LiveConfigFile::default()
        }
    }
}

/// Return the config file path: `$BEACON_LIVE_CONFIG` or
/// `~/.config/omni/beacon-live/config.toml`
pub fn config_file_path(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(path) = env("BEACON_LIVE_CONFIG").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-live")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\nmodel = \"models/custom\"\nreconnect_backoff_ms = 50\n\n[audio]\nchunk_samples = 2048"
        )
        .unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.session.model.as_deref(), Some("models/custom"));
        assert_eq!(config.session.reconnect_backoff_ms, Some(50));
        assert_eq!(config.audio.chunk_samples, Some(2048));
        assert!(config.wake_word.keyword.is_none());
    }

    #[test]
    fn unknown_section_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nmodel = \"x\"").unwrap();
        assert!(read_config_file(file.path()).is_err());
    }

    #[test]
    fn misspelled_nested_key_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nreconect_backoff_ms = 500").unwrap();

        let err = read_config_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
        assert!(err.to_string().contains("reconect_backoff_ms"), "{err}");
    }

    #[test]
    fn misspelled_key_keeps_defaults_when_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[audio]\nchunk_sample = 2048").unwrap();
        let config = load_config_file(Some(file.path()));
        assert!(config.audio.chunk_samples.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(config.session.model.is_none());
    }

    #[test]
    fn env_overrides_path() {
        let path = config_file_path(|key| {
            (key == "BEACON_LIVE_CONFIG").then(|| "/tmp/live.toml".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/tmp/live.toml")));
    }
}
