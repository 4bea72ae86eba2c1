//! Screen sharing source
//!
//! Frames are grabbed as JPEG and streamed as realtime media alongside the
//! microphone while sharing is on.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{Error, Result};

/// An open display capture
#[async_trait]
pub trait ScreenCapture: Send {
    /// Grab the current screen as JPEG bytes
    ///
    /// # Errors
    ///
    /// Returns error if the frame cannot be captured
    async fn grab(&mut self) -> Result<Vec<u8>>;
}

/// Grants display captures
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Request display access
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] if access is denied or unsupported
    async fn open(&self) -> Result<Box<dyn ScreenCapture>>;
}

/// Screenshot tools tried in order, with the output path appended
#[cfg(target_os = "macos")]
const GRABBERS: &[(&str, &[&str])] = &[("screencapture", &["-x", "-t", "jpg"])];

#[cfg(target_os = "linux")]
const GRABBERS: &[(&str, &[&str])] = &[
    ("grim", &["-t", "jpeg"]),
    ("import", &["-window", "root"]),
];

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const GRABBERS: &[(&str, &[&str])] = &[];

/// Grabs frames by running the platform screenshot tool
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandScreenSource;

#[async_trait]
impl ScreenSource for CommandScreenSource {
    async fn open(&self) -> Result<Box<dyn ScreenCapture>> {
        for &(program, args) in GRABBERS {
            let mut capture = CommandCapture { program, args };
            // Probe once so a denial surfaces here instead of mid-session
            match capture.grab().await {
                Ok(_) => {
                    tracing::info!(program, "screen capture available");
                    return Ok(Box::new(capture));
                }
                Err(e) => tracing::debug!(program, error = %e, "screen grabber unusable"),
            }
        }
        Err(Error::Permission(
            "screen capture is unavailable or was denied".to_string(),
        ))
    }
}

struct CommandCapture {
    program: &'static str,
    args: &'static [&'static str],
}

impl CommandCapture {
    fn frame_path() -> PathBuf {
        std::env::temp_dir().join(format!("beacon-live-{}.jpg", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn grab(&mut self) -> Result<Vec<u8>> {
        let path = Self::frame_path();
        let output = tokio::process::Command::new(self.program)
            .args(self.args)
            .arg(&path)
            .output()
            .await
            .map_err(|e| Error::Permission(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Permission(format!(
                "{} exited with {}: {stderr}",
                self.program, output.status
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok(bytes)
    }
}
