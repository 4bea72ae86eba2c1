//! Opening URLs in the user's browser

use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use crate::{Error, Result};

/// Side-effect target of the URL tools
pub trait UrlOpener: Send + Sync {
    /// Open `url` in the default browser
    ///
    /// # Errors
    ///
    /// Returns error if no opener could be launched
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform opener (`open`, `xdg-open` or `start`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        #[cfg(target_os = "macos")]
        let mut cmd = {
            let mut c = Command::new("open");
            c.arg(url);
            c
        };

        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]).arg(url);
            c
        };

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let mut cmd = {
            let mut c = Command::new("xdg-open");
            c.arg(url);
            c
        };

        launch(&mut cmd, url)?;
        tracing::debug!(url, "opened url");
        Ok(())
    }
}

/// Spawn the opener and reap it on a detached thread
///
/// The opener usually hands off to a running browser and exits quickly; a
/// non-zero exit is logged since the caller has already answered the tool
/// call by then.
fn launch(cmd: &mut Command, url: &str) -> Result<JoinHandle<Option<ExitStatus>>> {
    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Tool(format!("failed to launch browser: {e}")))?;

    let url = url.to_string();
    let reaper = std::thread::Builder::new()
        .name("url-opener".into())
        .spawn(move || match child.wait() {
            Ok(status) => {
                if !status.success() {
                    tracing::warn!(url = %url, %status, "browser opener exited with failure");
                }
                Some(status)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "failed to wait for browser opener");
                None
            }
        })?;
    Ok(reaper)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn opener_exit_status_is_collected() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let status = launch(&mut cmd, "https://example.org")
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn missing_opener_is_a_tool_error() {
        let mut cmd = Command::new("/nonexistent/opener");
        let err = launch(&mut cmd, "https://example.org").unwrap_err();
        assert!(matches!(err, Error::Tool(_)), "{err}");
    }
}
