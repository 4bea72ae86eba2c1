//! Error types for Beacon Live

use thiserror::Error;

/// Result type alias for Beacon Live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon Live
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, bad config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone or display access was denied or is unavailable
    #[error("permission denied: {0}")]
    Permission(String),

    /// Realtime transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Audio device or playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio payload decode error
    #[error("decode error: {0}")]
    Decode(String),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structured classification of transport failures
///
/// Retry decisions are made on this kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Network-level failure (reset, timeout, DNS, TLS). Worth one retry.
    Network,
    /// The connection was already closed or closed normally
    Closed,
    /// The service refused the session (bad key, quota, 4xx)
    Rejected,
    /// Malformed frames or protocol violation
    Protocol,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Closed => write!(f, "closed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// Transport failure with its classification
#[derive(Debug, Clone, Error)]
#[error("{kind} transport error: {message}")]
pub struct TransportError {
    /// Failure class
    pub kind: TransportErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl TransportError {
    /// Create a transport error of the given kind
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network-class failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Connection already closed
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let kind = match &err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportErrorKind::Closed,
            WsError::Io(_) | WsError::Tls(_) => TransportErrorKind::Network,
            WsError::Http(response) if response.status().is_server_error() => {
                TransportErrorKind::Network
            }
            WsError::Http(_) => TransportErrorKind::Rejected,
            _ => TransportErrorKind::Protocol,
        };

        Self::new(kind, err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.into())
    }
}

/// How far an error escalates through the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid configuration; fatal for any connect attempt
    Configuration,
    /// Device access denied; fatal for the current attempt
    Permission,
    /// Network-class failure; one automatic retry
    Transient,
    /// Normal close; not a failure
    Benign,
    /// Unrecoverable transport failure
    Fatal,
    /// Absorbed locally (tools, playback, decode)
    Local,
}

impl Error {
    /// Classify this error for escalation and retry decisions
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) => ErrorClass::Configuration,
            Self::Permission(_) => ErrorClass::Permission,
            Self::Transport(t) => match t.kind {
                TransportErrorKind::Network => ErrorClass::Transient,
                TransportErrorKind::Closed => ErrorClass::Benign,
                TransportErrorKind::Rejected | TransportErrorKind::Protocol => ErrorClass::Fatal,
            },
            Self::Audio(_)
            | Self::Decode(_)
            | Self::Tool(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorClass::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        let err = Error::from(TransportError::network("connection reset"));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn closed_errors_are_benign() {
        let err = Error::from(TransportError::closed("already closed"));
        assert_eq!(err.class(), ErrorClass::Benign);
    }

    #[test]
    fn rejected_errors_are_fatal() {
        let err = Error::from(TransportError::new(TransportErrorKind::Rejected, "403"));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn classification_ignores_message_text() {
        // A protocol error that happens to mention "network error" is still fatal
        let err = Error::from(TransportError::new(
            TransportErrorKind::Protocol,
            "network error in frame header",
        ));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn tungstenite_closed_maps_to_closed() {
        let err = TransportError::from(tokio_tungstenite::tungstenite::Error::AlreadyClosed);
        assert_eq!(err.kind, TransportErrorKind::Closed);
    }

    #[test]
    fn local_errors_stay_local() {
        assert_eq!(Error::Tool("boom".into()).class(), ErrorClass::Local);
        assert_eq!(Error::Decode("bad".into()).class(), ErrorClass::Local);
        assert_eq!(Error::Permission("mic".into()).class(), ErrorClass::Permission);
        assert_eq!(Error::Config("key".into()).class(), ErrorClass::Configuration);
    }
}
