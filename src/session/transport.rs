//! Realtime transport abstraction
//!
//! A transport dials the remote service and hands back a [`LiveLink`]: an
//! outbound [`SessionHandle`] plus a receiver of inbound [`TransportEvent`]s.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::tools::{ToolCall, ToolResult};
use crate::voice::MediaBlob;
use crate::Result;

/// Everything the service needs to open a session
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Model resource name, e.g. `models/gemini-2.0-flash-exp`
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// System instruction text
    pub instructions: String,
    /// Function declarations offered to the model
    pub tools: Vec<Value>,
    /// Ask the service to transcribe user audio
    pub input_transcription: bool,
    /// Ask the service to transcribe assistant audio
    pub output_transcription: bool,
}

/// Frame queued for the service
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Realtime media chunk (audio or screen frame)
    Realtime(MediaBlob),
    /// A typed user turn
    Text(String),
    /// Results of a tool-call batch
    ToolResponse(Vec<ToolResult>),
    /// Close the connection
    Close,
}

/// Parsed server message content
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Setup acknowledged
    SetupComplete,
    /// Decoded PCM16 audio bytes
    Audio {
        /// Little-endian PCM16
        data: Vec<u8>,
        /// Rate from the MIME descriptor
        sample_rate: u32,
    },
    /// Text part of a model turn
    Text(String),
    /// Transcription of user speech
    InputTranscript(String),
    /// Transcription of assistant speech
    OutputTranscript(String),
    /// The model finished its turn
    TurnComplete,
    /// The user barged in; drop queued audio
    Interrupted,
    /// Tool calls to run
    ToolCalls(Vec<ToolCall>),
    /// Previously issued tool calls the model no longer wants
    ToolCallCancellation(Vec<String>),
    /// The server will disconnect soon
    GoAway {
        /// Remaining time as reported by the server
        time_left: Option<String>,
    },
}

/// Something that happened on the connection
#[derive(Debug)]
pub enum TransportEvent {
    /// One server message, possibly carrying several events
    Message(Vec<ServerEvent>),
    /// The server closed the connection
    Closed {
        /// Close reason, if any
        reason: Option<String>,
    },
    /// The connection failed
    Error(TransportError),
}

/// Outbound side of an open session
///
/// Cloning yields another sender to the same connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    /// Create a handle and the receiver the transport drains
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, frame: Outbound) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::closed("session handle is closed").into())
    }

    /// Queue a realtime media chunk
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    pub fn send_realtime(&self, blob: MediaBlob) -> Result<()> {
        self.send(Outbound::Realtime(blob))
    }

    /// Queue a typed user turn
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Outbound::Text(text.into()))
    }

    /// Queue the results of a tool-call batch
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    pub fn send_tool_response(&self, results: Vec<ToolResult>) -> Result<()> {
        self.send(Outbound::ToolResponse(results))
    }

    /// Ask the transport to close the connection. Errors are ignored.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Whether the transport has stopped draining this handle
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open session
#[derive(Debug)]
pub struct LiveLink {
    /// Outbound frames
    pub handle: SessionHandle,
    /// Inbound events
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Dials the remote conversational service
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a session configured by `setup`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transport`] classified by failure kind
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveLink>;
}
