//! Session status

/// Lifecycle state of the voice session
///
/// Exactly one value holds at a time; only the controller changes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// No session; the wake word gate may be listening
    #[default]
    Idle,
    /// Dialing the realtime service
    Connecting,
    /// Session open, microphone streaming
    Listening,
    /// A tool-call batch is being handled
    Thinking,
    /// Assistant audio is playing
    Speaking,
    /// Terminal failure for the current attempt
    Error,
}

impl SessionStatus {
    /// Whether a session is open (listening, thinking or speaking)
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Listening | Self::Thinking | Self::Speaking)
    }

    /// Whether a new connect may be issued from this status
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Listening => write!(f, "listening"),
            Self::Thinking => write!(f, "thinking"),
            Self::Speaking => write!(f, "speaking"),
            Self::Error => write!(f, "error"),
        }
    }
}
