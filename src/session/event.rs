//! Session events
//!
//! Every external callback (transport, devices, timers, wake word, user
//! commands) is turned into one of these and posted to the controller's
//! queue. Events raised on behalf of a session carry the epoch they were
//! created under; the controller drops those from an older epoch.

use super::transport::{LiveLink, TransportEvent};
use crate::Error;
use crate::screen::ScreenCapture;
use crate::voice::CaptureHandle;

/// Session generation counter
pub type Epoch = u64;

/// Input to [`super::SessionController::handle`]
pub enum SessionEvent {
    /// User asked to connect
    Connect,
    /// User asked to disconnect
    Disconnect,
    /// Tear everything down and stop the event loop
    Shutdown,
    /// Send a typed user turn
    SendText(String),
    /// Begin streaming the screen
    StartScreenShare,
    /// Stop streaming the screen
    StopScreenShare,

    /// Dial succeeded
    TransportOpened { epoch: Epoch, link: LiveLink },
    /// Dial failed
    ConnectFailed { epoch: Epoch, error: Error },
    /// Inbound traffic on the open session
    Transport { epoch: Epoch, event: TransportEvent },

    /// Microphone access granted
    MicrophoneOpened {
        epoch: Epoch,
        capture: Box<dyn CaptureHandle>,
    },
    /// Microphone access denied or unavailable
    MicrophoneFailed { epoch: Epoch, error: Error },
    /// One captured frame at the device rate
    CaptureFrame {
        epoch: Epoch,
        samples: Vec<f32>,
        sample_rate: u32,
    },
    /// A playback unit finished naturally
    PlaybackEnded { epoch: Epoch, unit: u64 },

    /// Reconnect backoff elapsed
    RetryElapsed { epoch: Epoch },
    /// Wake word restart delay elapsed
    WakeWordRestart { epoch: Epoch },
    /// The wake word engine fired
    WakeWordDetected { epoch: Epoch },

    /// Display access granted
    ScreenShareOpened {
        epoch: Epoch,
        capture: Box<dyn ScreenCapture>,
    },
    /// Display access denied or a frame grab failed
    ScreenShareFailed { epoch: Epoch, error: Error },
}

impl SessionEvent {
    /// Short event name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Shutdown => "shutdown",
            Self::SendText(_) => "send_text",
            Self::StartScreenShare => "start_screen_share",
            Self::StopScreenShare => "stop_screen_share",
            Self::TransportOpened { .. } => "transport_opened",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Transport { .. } => "transport",
            Self::MicrophoneOpened { .. } => "microphone_opened",
            Self::MicrophoneFailed { .. } => "microphone_failed",
            Self::CaptureFrame { .. } => "capture_frame",
            Self::PlaybackEnded { .. } => "playback_ended",
            Self::RetryElapsed { .. } => "retry_elapsed",
            Self::WakeWordRestart { .. } => "wake_word_restart",
            Self::WakeWordDetected { .. } => "wake_word_detected",
            Self::ScreenShareOpened { .. } => "screen_share_opened",
            Self::ScreenShareFailed { .. } => "screen_share_failed",
        }
    }

    /// Epoch the event belongs to; `None` for user commands
    #[must_use]
    pub const fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::Connect
            | Self::Disconnect
            | Self::Shutdown
            | Self::SendText(_)
            | Self::StartScreenShare
            | Self::StopScreenShare => None,
            Self::TransportOpened { epoch, .. }
            | Self::ConnectFailed { epoch, .. }
            | Self::Transport { epoch, .. }
            | Self::MicrophoneOpened { epoch, .. }
            | Self::MicrophoneFailed { epoch, .. }
            | Self::CaptureFrame { epoch, .. }
            | Self::PlaybackEnded { epoch, .. }
            | Self::RetryElapsed { epoch }
            | Self::WakeWordRestart { epoch }
            | Self::WakeWordDetected { epoch }
            | Self::ScreenShareOpened { epoch, .. }
            | Self::ScreenShareFailed { epoch, .. } => Some(*epoch),
        }
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SessionEvent");
        s.field("name", &self.name());
        if let Some(epoch) = self.epoch() {
            s.field("epoch", &epoch);
        }
        s.finish()
    }
}
