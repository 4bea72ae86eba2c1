//! Gemini Live transport over WebSocket
//!
//! Wire format: one JSON object per frame. The client sends `setup` first and
//! waits for `setupComplete`; after that realtime media, text turns and tool
//! responses flow out while server content flows in.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::transport::{
    LiveLink, LiveTransport, Outbound, ServerEvent, SessionHandle, SessionSetup, TransportEvent,
};
use crate::error::{TransportError, TransportErrorKind};
use crate::tools::{ToolCall, ToolResult};
use crate::voice::PLAYBACK_SAMPLE_RATE;
use crate::voice::codec::{decode_base64, rate_from_mime};
use crate::Result;

/// Default Gemini Live endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// How long to wait for `setupComplete`
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the reader waits for the server's close frame after ours
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Dials Gemini Live with an API key
pub struct GeminiTransport {
    endpoint: String,
    api_key: SecretString,
}

impl GeminiTransport {
    /// Create a transport for `endpoint` authenticated by `api_key`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}?key={}",
            self.endpoint,
            urlencoding::encode(self.api_key.expose_secret())
        )
    }
}

impl std::fmt::Debug for GeminiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LiveTransport for GeminiTransport {
    async fn connect(&self, setup: &SessionSetup) -> Result<LiveLink> {
        tracing::debug!(endpoint = %self.endpoint, model = %setup.model, "dialing realtime service");

        let (ws, _response) = tokio_tungstenite::connect_async(self.url())
            .await
            .map_err(TransportError::from)?;
        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(setup_message(setup).to_string()))
            .await
            .map_err(TransportError::from)?;

        let ack = tokio::time::timeout(SETUP_TIMEOUT, read.next())
            .await
            .map_err(|_| TransportError::network("timed out waiting for setup acknowledgement"))?;

        match ack {
            Some(Ok(msg)) => match frame_text(msg) {
                Frame::Json(text) => {
                    let events = parse_server_message(&text)?;
                    if !events.contains(&ServerEvent::SetupComplete) {
                        return Err(TransportError::new(
                            TransportErrorKind::Protocol,
                            "expected setupComplete",
                        )
                        .into());
                    }
                }
                Frame::Close(reason) => {
                    // Invalid keys and unknown models are reported as a close frame
                    return Err(TransportError::new(
                        TransportErrorKind::Rejected,
                        reason.unwrap_or_else(|| "closed during setup".to_string()),
                    )
                    .into());
                }
                Frame::Other => {
                    return Err(TransportError::new(
                        TransportErrorKind::Protocol,
                        "unexpected frame during setup",
                    )
                    .into());
                }
            },
            Some(Err(e)) => return Err(TransportError::from(e).into()),
            None => return Err(TransportError::network("connection dropped during setup").into()),
        }

        tracing::info!(model = %setup.model, "realtime session open");

        Ok(spawn_link(write, read, CLOSE_GRACE))
    }
}

/// Start the writer and reader tasks for an open session
///
/// After the client's close frame is sent the reader gets `close_grace` to
/// see the server's close before it is aborted.
fn spawn_link<W, R>(mut write: W, mut read: R, close_grace: Duration) -> LiveLink
where
    W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin + Send + 'static,
{
    let (handle, mut outbound) = SessionHandle::channel();
    let (event_tx, inbound) = mpsc::unbounded_channel();

    let writer_events = event_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    let err = TransportError::from(e);
                    let event = if err.kind == TransportErrorKind::Closed {
                        TransportEvent::Closed { reason: None }
                    } else {
                        TransportEvent::Error(err)
                    };
                    let _ = event_tx.send(event);
                    return;
                }
            };

            match frame_text(msg) {
                Frame::Json(text) => match parse_server_message(&text) {
                    Ok(events) if events.is_empty() => {}
                    Ok(events) => {
                        if event_tx.send(TransportEvent::Message(events)).is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "unparseable server message"),
                },
                Frame::Close(reason) => {
                    let _ = event_tx.send(TransportEvent::Closed { reason });
                    return;
                }
                Frame::Other => {}
            }
        }
        let _ = event_tx.send(TransportEvent::Closed { reason: None });
    });
    let reader = reader.abort_handle();

    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let payload = match frame {
                Outbound::Close => break,
                other => client_message(&other),
            };
            if let Err(e) = write.send(Message::Text(payload.to_string())).await {
                let _ = writer_events.send(TransportEvent::Error(e.into()));
                return;
            }
        }
        let _ = write.send(Message::Close(None)).await;
        tracing::debug!("realtime writer finished");

        tokio::time::sleep(close_grace).await;
        if !reader.is_finished() {
            tracing::debug!("no close frame from server, dropping reader");
            reader.abort();
        }
    });

    LiveLink { handle, inbound }
}

enum Frame {
    Json(String),
    Close(Option<String>),
    Other,
}

fn frame_text(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Json(text),
        // The service sends JSON in binary frames too
        Message::Binary(bytes) => {
            String::from_utf8(bytes).map_or(Frame::Other, Frame::Json)
        }
        Message::Close(frame) => Frame::Close(
            frame
                .map(|f| f.reason.to_string())
                .filter(|reason| !reason.is_empty()),
        ),
        _ => Frame::Other,
    }
}

/// Build the initial `setup` message
#[must_use]
pub fn setup_message(setup: &SessionSetup) -> Value {
    let mut body = json!({
        "model": setup.model,
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": setup.voice }
                }
            }
        },
    });

    if !setup.instructions.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": setup.instructions }] });
    }
    if !setup.tools.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": setup.tools }]);
    }
    if setup.input_transcription {
        body["inputAudioTranscription"] = json!({});
    }
    if setup.output_transcription {
        body["outputAudioTranscription"] = json!({});
    }

    json!({ "setup": body })
}

/// Serialize an outbound frame
#[must_use]
pub fn client_message(frame: &Outbound) -> Value {
    match frame {
        Outbound::Realtime(blob) => json!({
            "realtimeInput": { "mediaChunks": [blob] }
        }),
        Outbound::Text(text) => json!({
            "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                "turnComplete": true
            }
        }),
        Outbound::ToolResponse(results) => json!({
            "toolResponse": { "functionResponses": results }
        }),
        Outbound::Close => Value::Null,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCallMessage>,
    tool_call_cancellation: Option<ToolCallCancellation>,
    go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<Content>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallMessage {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct ToolCallCancellation {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    time_left: Option<String>,
}

/// Parse one server message into events, in the order they should be handled
///
/// # Errors
///
/// Returns error if the message is not valid JSON
pub fn parse_server_message(text: &str) -> Result<Vec<ServerEvent>> {
    let msg: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if let Some(t) = content.input_transcription
            && !t.text.is_empty()
        {
            events.push(ServerEvent::InputTranscript(t.text));
        }
        for part in content.model_turn.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text
                && !text.is_empty()
            {
                events.push(ServerEvent::Text(text));
            }
            if let Some(inline) = part.inline_data {
                match audio_event(&inline) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {
                        tracing::debug!(mime = %inline.mime_type, "ignoring non-audio inline data");
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable audio part"),
                }
            }
        }
        if let Some(t) = content.output_transcription
            && !t.text.is_empty()
        {
            events.push(ServerEvent::OutputTranscript(t.text));
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(call) = msg.tool_call {
        let calls: Vec<ToolCall> = call
            .function_calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.name, c.args))
            .collect();
        if !calls.is_empty() {
            events.push(ServerEvent::ToolCalls(calls));
        }
    }

    if let Some(cancel) = msg.tool_call_cancellation {
        events.push(ServerEvent::ToolCallCancellation(cancel.ids));
    }

    if let Some(go_away) = msg.go_away {
        events.push(ServerEvent::GoAway {
            time_left: go_away.time_left,
        });
    }

    Ok(events)
}

fn audio_event(inline: &InlineData) -> Result<Option<ServerEvent>> {
    if !inline.mime_type.starts_with("audio/pcm") {
        return Ok(None);
    }
    let data = decode_base64(&inline.data)?;
    let sample_rate = rate_from_mime(&inline.mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE);
    Ok(Some(ServerEvent::Audio { data, sample_rate }))
}
