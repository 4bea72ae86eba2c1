//! Tool dispatcher
//!
//! Runs a server tool-call batch and answers every call. Failures become
//! `{"error": ...}` payloads; nothing escapes to the session.

use std::sync::Arc;

use serde_json::{Value, json};

use super::call::{ThemeMode, ToolCall, ToolRequest, ToolResult};
use super::opener::UrlOpener;
use super::system::SystemSnapshot;
use super::url::{normalize_url, search_url};
use crate::Result;
use crate::session::SessionStatus;

/// Executes the client-side tools offered to the model
pub struct ToolDispatcher {
    opener: Arc<dyn UrlOpener>,
    theme: ThemeMode,
}

impl ToolDispatcher {
    /// Create a dispatcher that opens URLs through `opener`
    #[must_use]
    pub fn new(opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            opener,
            theme: ThemeMode::default(),
        }
    }

    /// Current theme
    #[must_use]
    pub const fn theme(&self) -> ThemeMode {
        self.theme
    }

    /// Run a batch; returns exactly one result per call, in call order
    pub fn dispatch(&mut self, calls: &[ToolCall], status: SessionStatus) -> Vec<ToolResult> {
        calls
            .iter()
            .map(|call| {
                tracing::debug!(id = %call.id, tool = %call.name, "executing tool");
                match self.execute(call, status) {
                    Ok(response) => ToolResult::new(&call.id, &call.name, response),
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool failed");
                        ToolResult::error(call, e)
                    }
                }
            })
            .collect()
    }

    fn execute(&mut self, call: &ToolCall, status: SessionStatus) -> Result<Value> {
        match ToolRequest::parse(&call.name, &call.args)? {
            ToolRequest::OpenUrl { url } => {
                let url = normalize_url(&url)?;
                Ok(self.open(&url))
            }
            ToolRequest::GoogleSearch { query } => Ok(self.open(&search_url(&query))),
            ToolRequest::ChangeTheme { mode } => {
                self.theme = mode;
                Ok(json!({
                    "success": true,
                    "theme": mode,
                    "message": format!("Switched to {mode} mode"),
                }))
            }
            ToolRequest::GetSystemStatus => {
                let mut snapshot = serde_json::to_value(SystemSnapshot::capture())?;
                snapshot["theme"] = json!(self.theme);
                snapshot["sessionStatus"] = json!(status.to_string());
                Ok(snapshot)
            }
            ToolRequest::Unsupported { name } => Ok(json!({
                "error": format!("unsupported tool: {name}")
            })),
        }
    }

    /// Open `url`; on failure report it so the user can open it by hand
    fn open(&self, url: &str) -> Value {
        match self.opener.open(url) {
            Ok(()) => json!({
                "success": true,
                "url": url,
                "message": format!("Opened {url}"),
            }),
            Err(e) => {
                tracing::warn!(url, error = %e, "could not open url");
                json!({
                    "success": false,
                    "url": url,
                    "message": format!("Could not open the browser; open {url} manually"),
                })
            }
        }
    }
}

/// Function declarations advertised in the session setup
#[must_use]
pub fn declarations() -> Vec<Value> {
    vec![
        json!({
            "name": "openUrl",
            "description": "Open a website in the user's default browser",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "url": { "type": "STRING", "description": "Website address or name, e.g. reddit.com" }
                },
                "required": ["url"]
            }
        }),
        json!({
            "name": "googleSearch",
            "description": "Search Google and open the results in the browser",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "query": { "type": "STRING", "description": "Search terms" }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "changeTheme",
            "description": "Switch the interface between light and dark mode",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "mode": { "type": "STRING", "enum": ["light", "dark"] }
                },
                "required": ["mode"]
            }
        }),
        json!({
            "name": "getSystemStatus",
            "description": "Report host name, operating system, CPU count, local time and assistant status"
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<String>>,
        fail: bool,
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Tool("no browser".into()));
            }
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    #[test]
    fn opens_normalized_url() {
        let opener = Arc::new(RecordingOpener::default());
        let mut dispatcher = ToolDispatcher::new(opener.clone());
        let results = dispatcher.dispatch(
            &[ToolCall::new("1", "openUrl", json!({"url": "REDDIT"}))],
            SessionStatus::Thinking,
        );
        assert_eq!(results[0].response["success"], true);
        assert_eq!(results[0].response["url"], "https://reddit.com");
        assert_eq!(opener.opened.lock().unwrap().as_slice(), ["https://reddit.com"]);
    }

    #[test]
    fn opener_failure_falls_back_to_manual_url() {
        let opener = Arc::new(RecordingOpener {
            fail: true,
            ..RecordingOpener::default()
        });
        let mut dispatcher = ToolDispatcher::new(opener);
        let results = dispatcher.dispatch(
            &[ToolCall::new("1", "googleSearch", json!({"query": "rust"}))],
            SessionStatus::Thinking,
        );
        assert_eq!(results[0].response["success"], false);
        assert_eq!(results[0].response["url"], "https://www.google.com/search?q=rust");
        assert!(!results[0].is_error());
    }

    #[test]
    fn theme_change_is_remembered() {
        let mut dispatcher = ToolDispatcher::new(Arc::new(RecordingOpener::default()));
        dispatcher.dispatch(
            &[ToolCall::new("1", "changeTheme", json!({"mode": "light"}))],
            SessionStatus::Thinking,
        );
        assert_eq!(dispatcher.theme(), ThemeMode::Light);

        let results = dispatcher.dispatch(
            &[ToolCall::new("2", "getSystemStatus", json!({}))],
            SessionStatus::Speaking,
        );
        assert_eq!(results[0].response["theme"], "light");
        assert_eq!(results[0].response["sessionStatus"], "speaking");
    }

    #[test]
    fn unsupported_tool_reports_error() {
        let mut dispatcher = ToolDispatcher::new(Arc::new(RecordingOpener::default()));
        let results = dispatcher.dispatch(
            &[ToolCall::new("9", "deleteEverything", json!({}))],
            SessionStatus::Thinking,
        );
        assert_eq!(results[0].response["error"], "unsupported tool: deleteEverything");
    }

    #[test]
    fn declarations_name_every_tool() {
        let names: Vec<_> = declarations()
            .iter()
            .filter_map(|d| d["name"].as_str().map(str::to_string))
            .collect();
        assert_eq!(names, ["openUrl", "googleSearch", "changeTheme", "getSystemStatus"]);
    }
}
