//! Tool calls, results and validated requests

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result};

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed in the result
    pub id: String,
    /// Function name
    pub name: String,
    /// Raw JSON arguments
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of one tool call, sent back in the batch response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    /// Id of the call this answers
    pub id: String,
    /// Function name
    pub name: String,
    /// JSON payload; failures carry an `error` field
    pub response: Value,
}

impl ToolResult {
    /// Create a result
    pub fn new(id: impl Into<String>, name: impl Into<String>, response: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response,
        }
    }

    /// Error result for `call`
    #[must_use]
    pub fn error(call: &ToolCall, message: impl std::fmt::Display) -> Self {
        Self::new(&call.id, &call.name, json!({ "error": message.to_string() }))
    }

    /// Whether the payload reports an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// UI theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    #[default]
    Dark,
}

impl std::str::FromStr for ThemeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(Error::Tool(format!("unknown theme mode: {other}"))),
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

/// A tool call with its arguments validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    /// Open a URL in the default browser
    OpenUrl {
        /// URL as spoken; normalized before opening
        url: String,
    },
    /// Open a Google search
    GoogleSearch {
        /// Search terms
        query: String,
    },
    /// Switch the UI theme
    ChangeTheme {
        /// Requested mode
        mode: ThemeMode,
    },
    /// Report host and session facts
    GetSystemStatus,
    /// A tool this client does not provide
    Unsupported {
        /// Requested function name
        name: String,
    },
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

#[derive(Deserialize)]
struct ThemeArgs {
    mode: String,
}

fn args<T: serde::de::DeserializeOwned>(name: &str, args: &Value) -> Result<T> {
    T::deserialize(args).map_err(|e| Error::Tool(format!("invalid arguments for {name}: {e}")))
}

impl ToolRequest {
    /// Validate a call's arguments
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] if a known tool is missing required arguments
    pub fn parse(name: &str, raw: &Value) -> Result<Self> {
        match name {
            "openUrl" => {
                let UrlArgs { url } = args(name, raw)?;
                Ok(Self::OpenUrl { url })
            }
            "googleSearch" => {
                let QueryArgs { query } = args(name, raw)?;
                if query.trim().is_empty() {
                    return Err(Error::Tool("empty search query".to_string()));
                }
                Ok(Self::GoogleSearch { query })
            }
            "changeTheme" => {
                let ThemeArgs { mode } = args(name, raw)?;
                Ok(Self::ChangeTheme { mode: mode.parse()? })
            }
            "getSystemStatus" => Ok(Self::GetSystemStatus),
            other => Ok(Self::Unsupported {
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tools() {
        assert_eq!(
            ToolRequest::parse("openUrl", &json!({"url": "reddit"})).unwrap(),
            ToolRequest::OpenUrl { url: "reddit".into() }
        );
        assert_eq!(
            ToolRequest::parse("changeTheme", &json!({"mode": "Light"})).unwrap(),
            ToolRequest::ChangeTheme { mode: ThemeMode::Light }
        );
        assert_eq!(
            ToolRequest::parse("getSystemStatus", &Value::Null).unwrap(),
            ToolRequest::GetSystemStatus
        );
    }

    #[test]
    fn unknown_tool_is_unsupported() {
        assert_eq!(
            ToolRequest::parse("launchRockets", &json!({})).unwrap(),
            ToolRequest::Unsupported { name: "launchRockets".into() }
        );
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert!(ToolRequest::parse("openUrl", &json!({})).is_err());
        assert!(ToolRequest::parse("googleSearch", &json!({"query": "  "})).is_err());
        assert!(ToolRequest::parse("changeTheme", &json!({"mode": "sepia"})).is_err());
    }

    #[test]
    fn error_result_keeps_id() {
        let call = ToolCall::new("7", "openUrl", json!({}));
        let result = ToolResult::error(&call, "boom");
        assert_eq!(result.id, "7");
        assert!(result.is_error());
    }
}
