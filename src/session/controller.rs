//! Session controller
//!
//! Owns the session handle, audio pipeline, wake word gate, tool dispatcher
//! and timers. [`SessionController::handle`] is the synchronous transition
//! function; anything asynchronous (dialing, device permission, timers) runs
//! in a spawned task that posts its outcome back as a [`SessionEvent`].
//!
//! ```text
//!            connect                open               audio
//!   Idle ─────────────▶ Connecting ──────▶ Listening ─────────▶ Speaking
//!    ▲                                       ▲   │ tool calls      │
//!    │ close / disconnect                    │   ▼                 │
//!    └───────────────────────────────────  Thinking ◀──────────────┘
//!                                     turn complete / drained
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::event::{Epoch, SessionEvent};
use super::retry::{RetryDecision, RetryPolicy, RetryState};
use super::status::SessionStatus;
use super::timers::{TimerKind, Timers};
use super::transport::{LiveLink, LiveTransport, ServerEvent, SessionHandle, SessionSetup, TransportEvent};
use crate::Error;
use crate::config::SessionConfig;
use crate::log::{ConversationLog, LogEntry, LogKind, LogSource};
use crate::screen::{ScreenCapture, ScreenSource};
use crate::tools::{ThemeMode, ToolCall, ToolDispatcher, UrlOpener, declarations};
use crate::voice::{
    AudioOutput, AudioPipeline, CaptureHandle, FrameSink, GateContext, MediaBlob, Microphone,
    PipelineConfig, WakeWordEngine, WakeWordGate,
};

/// Channel count of audio received from the service
const RESPONSE_CHANNELS: u16 = 1;

/// Collaborators the controller drives
pub struct Backends {
    /// Realtime service; `None` when no credential is configured
    pub transport: Option<Arc<dyn LiveTransport>>,
    /// Session microphone
    pub microphone: Arc<dyn Microphone>,
    /// Speaker output
    pub output: Box<dyn AudioOutput>,
    /// Wake word engine; `None` disables the gate
    pub wake_word: Option<Box<dyn WakeWordEngine>>,
    /// Display capture for screen sharing
    pub screen: Option<Arc<dyn ScreenSource>>,
    /// Browser launcher for the URL tools
    pub opener: Arc<dyn UrlOpener>,
}

/// Whether the event loop should keep running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing events
    Continue,
    /// Shut down
    Exit,
}

/// Drives one voice session at a time
pub struct SessionController {
    config: SessionConfig,
    setup: SessionSetup,
    retry_policy: RetryPolicy,

    transport: Option<Arc<dyn LiveTransport>>,
    microphone: Arc<dyn Microphone>,
    screen: Option<Arc<dyn ScreenSource>>,

    pipeline: AudioPipeline,
    gate: WakeWordGate,
    tools: ToolDispatcher,
    log: ConversationLog,
    timers: Timers,

    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
    retry: RetryState,
    session: Option<SessionHandle>,
    screen_sharing: bool,
    epoch: Epoch,
    stopping: bool,

    input_transcript: String,
    output_transcript: String,

    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionController {
    /// Create a controller and the receiving end of its event queue
    #[must_use]
    pub fn new(
        config: SessionConfig,
        backends: Backends,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SessionStatus::Idle);

        let setup = SessionSetup {
            model: config.model.clone(),
            voice: config.voice.clone(),
            instructions: config.instructions.clone(),
            tools: declarations(),
            input_transcription: config.transcription,
            output_transcription: config.transcription,
        };
        let pipeline_config = PipelineConfig {
            input_sample_rate: config.input_sample_rate,
            chunk_samples: config.chunk_samples,
            silence_epsilon: config.silence_epsilon,
        };
        let retry_policy = RetryPolicy {
            backoff: config.reconnect_backoff,
            ..RetryPolicy::default()
        };

        let controller = Self {
            setup,
            retry_policy,
            transport: backends.transport,
            microphone: backends.microphone,
            screen: backends.screen,
            pipeline: AudioPipeline::new(pipeline_config, backends.output),
            gate: WakeWordGate::new(backends.wake_word),
            tools: ToolDispatcher::new(backends.opener),
            log: ConversationLog::new(),
            timers: Timers::new(),
            status: SessionStatus::Idle,
            status_tx,
            retry: RetryState::fresh(),
            session: None,
            screen_sharing: false,
            epoch: 0,
            stopping: false,
            input_transcript: String::new(),
            output_transcript: String::new(),
            events,
            config,
        };
        (controller, rx)
    }

    /// Sender for posting events from outside
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    /// Start the wake word gate if the session is idle
    pub fn start(&mut self) {
        self.start_gate();
    }

    /// Process events until shutdown
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = rx.recv().await {
            if self.handle(event) == Flow::Exit {
                break;
            }
        }
        tracing::debug!("session controller stopped");
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) -> Flow {
        if let Some(epoch) = event.epoch()
            && epoch != self.epoch
        {
            tracing::trace!(event = event.name(), epoch, current = self.epoch, "dropping stale event");
            Self::discard(event);
            return Flow::Continue;
        }

        match event {
            SessionEvent::Connect => self.connect(RetryState::fresh()),
            SessionEvent::Disconnect => self.disconnect(),
            SessionEvent::Shutdown => {
                self.disconnect();
                self.gate.stop();
                self.timers.cancel_all();
                return Flow::Exit;
            }
            SessionEvent::SendText(text) => self.send_text(&text),
            SessionEvent::StartScreenShare => self.start_screen_share(),
            SessionEvent::StopScreenShare => {
                if self.screen_sharing {
                    self.stop_screen_share();
                    self.log.info("screen sharing stopped");
                }
            }
            SessionEvent::TransportOpened { link, .. } => self.on_open(link),
            SessionEvent::ConnectFailed { error, .. } => self.on_failure(&error),
            SessionEvent::Transport { event, .. } => self.on_transport(event),
            SessionEvent::MicrophoneOpened { capture, .. } => self.on_microphone(capture),
            SessionEvent::MicrophoneFailed { error, .. } => self.on_microphone_denied(&error),
            SessionEvent::CaptureFrame {
                samples,
                sample_rate,
                ..
            } => self.on_capture_frame(&samples, sample_rate),
            SessionEvent::PlaybackEnded { unit, .. } => {
                if self.pipeline.finish_unit(unit) && self.status == SessionStatus::Speaking {
                    self.set_status(SessionStatus::Listening);
                }
            }
            SessionEvent::RetryElapsed { .. } => {
                tracing::info!(attempt = self.retry.retry_count, "reconnecting");
                self.connect(self.retry);
            }
            SessionEvent::WakeWordRestart { .. } => self.start_gate(),
            SessionEvent::WakeWordDetected { .. } => {
                self.gate.stop();
                self.log.info("wake word detected");
                self.connect(RetryState::fresh());
            }
            SessionEvent::ScreenShareOpened { capture, .. } => self.on_screen_opened(capture),
            SessionEvent::ScreenShareFailed { error, .. } => {
                self.stop_screen_share();
                self.log.error(format!("screen sharing unavailable: {error}"));
            }
        }
        Flow::Continue
    }

    /// Release resources carried by an event that arrived too late
    fn discard(event: SessionEvent) {
        match event {
            SessionEvent::TransportOpened { link, .. } => link.handle.close(),
            SessionEvent::MicrophoneOpened { mut capture, .. } => capture.stop(),
            _ => {}
        }
    }

    // -- connect / teardown ---------------------------------------------------

    fn connect(&mut self, retry: RetryState) {
        if self.retry.is_connecting || self.session.is_some() {
            tracing::debug!(status = %self.status, "connect ignored, session in progress");
            return;
        }

        self.gate.stop();
        self.timers.cancel(TimerKind::WakeRestart);
        self.timers.cancel(TimerKind::Reconnect);

        let Some(transport) = self.transport.clone() else {
            self.retry = RetryState::fresh();
            self.set_status(SessionStatus::Error);
            self.log.error(
                Error::Config("no realtime API key configured; set GEMINI_API_KEY".to_string())
                    .to_string(),
            );
            return;
        };

        self.retry = retry;
        self.retry.is_connecting = true;
        self.stopping = false;
        self.epoch += 1;
        let epoch = self.epoch;

        self.set_status(SessionStatus::Connecting);
        self.log.info("connecting");

        let setup = self.setup.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let event = match transport.connect(&setup).await {
                Ok(link) => SessionEvent::TransportOpened { epoch, link },
                Err(error) => SessionEvent::ConnectFailed { epoch, error },
            };
            let _ = tx.send(event);
        });
    }

    fn on_open(&mut self, link: LiveLink) {
        let LiveLink { handle, mut inbound } = link;
        let epoch = self.epoch;

        self.retry.opened();
        self.session = Some(handle);
        self.set_status(SessionStatus::Listening);
        self.log.info("connected");

        let tx = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                if tx.send(SessionEvent::Transport { epoch, event }).is_err() {
                    return;
                }
            }
            // Transport dropped its sender without a close frame
            let _ = tx.send(SessionEvent::Transport {
                epoch,
                event: TransportEvent::Closed { reason: None },
            });
        });

        let microphone = Arc::clone(&self.microphone);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let frames = tx.clone();
            let sink: FrameSink = Arc::new(move |samples, sample_rate| {
                let _ = frames.send(SessionEvent::CaptureFrame {
                    epoch,
                    samples,
                    sample_rate,
                });
            });
            let event = match microphone.open(sink).await {
                Ok(capture) => SessionEvent::MicrophoneOpened { epoch, capture },
                Err(error) => SessionEvent::MicrophoneFailed { epoch, error },
            };
            let _ = tx.send(event);
        });
    }

    /// Tear down everything tied to the current session
    ///
    /// Bumps the epoch so in-flight events from the old session are dropped.
    /// Does not touch the retry state.
    fn teardown(&mut self) {
        self.epoch += 1;
        self.stop_screen_share();
        self.pipeline.teardown();
        if let Some(handle) = self.session.take() {
            handle.close();
        }
        self.flush_transcripts();
    }

    fn disconnect(&mut self) {
        let was_active =
            self.session.is_some() || self.retry.is_connecting || self.status != SessionStatus::Idle;

        self.stopping = true;
        self.timers.cancel(TimerKind::Reconnect);
        self.teardown();
        self.retry = RetryState::fresh();
        self.set_status(SessionStatus::Idle);

        if was_active {
            self.log.info("disconnected");
        }
        self.schedule_wake_restart();
    }

    fn on_server_close(&mut self, reason: Option<&str>) {
        self.teardown();
        self.retry = RetryState::fresh();
        self.set_status(SessionStatus::Idle);
        match reason {
            Some(reason) => self.log.info(format!("session closed: {reason}")),
            None => self.log.info("session closed"),
        }
        self.schedule_wake_restart();
    }

    fn on_failure(&mut self, error: &Error) {
        match self.retry.on_failure(error.class(), &self.retry_policy) {
            RetryDecision::Ignore => {
                tracing::info!(error = %error, "connection closed");
                self.on_server_close(None);
            }
            RetryDecision::Reconnect(delay) => {
                tracing::warn!(error = %error, ?delay, "transient failure, will reconnect");
                self.teardown();
                self.set_status(SessionStatus::Error);
                self.log.error(format!("connection lost: {error}; retrying"));
                self.timers.after(
                    TimerKind::Reconnect,
                    delay,
                    self.events.clone(),
                    SessionEvent::RetryElapsed { epoch: self.epoch },
                );
            }
            RetryDecision::GiveUp => {
                tracing::error!(error = %error, class = ?error.class(), "session failed");
                self.teardown();
                self.set_status(SessionStatus::Error);
                self.log.error(format!("connection failed: {error}"));
            }
        }
    }

    // -- inbound --------------------------------------------------------------

    fn on_transport(&mut self, event: TransportEvent) {
        if self.stopping || self.session.is_none() {
            return;
        }
        match event {
            TransportEvent::Message(events) => {
                for event in events {
                    // A close or failure mid-batch invalidates the rest
                    if self.session.is_none() {
                        break;
                    }
                    self.on_server_event(event);
                }
            }
            TransportEvent::Closed { reason } => self.on_server_close(reason.as_deref()),
            TransportEvent::Error(error) => self.on_failure(&Error::Transport(error)),
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SetupComplete => tracing::debug!("setup acknowledged"),
            ServerEvent::Audio { data, sample_rate } => self.on_audio(&data, sample_rate),
            ServerEvent::Text(text) => self.log.text(LogSource::Assistant, text),
            ServerEvent::InputTranscript(text) => self.input_transcript.push_str(&text),
            ServerEvent::OutputTranscript(text) => self.output_transcript.push_str(&text),
            ServerEvent::TurnComplete => {
                self.flush_transcripts();
                if self.status.is_active() {
                    self.set_status(SessionStatus::Listening);
                }
            }
            ServerEvent::Interrupted => {
                self.pipeline.interrupt();
                self.flush_transcripts();
                tracing::debug!("assistant interrupted");
                if self.status == SessionStatus::Speaking {
                    self.set_status(SessionStatus::Listening);
                }
            }
            ServerEvent::ToolCalls(calls) => self.on_tool_calls(&calls),
            ServerEvent::ToolCallCancellation(ids) => {
                self.log.info(format!("tool calls cancelled: {}", ids.join(", ")));
            }
            ServerEvent::GoAway { time_left } => {
                self.log.info(format!(
                    "service will end the session soon ({})",
                    time_left.as_deref().unwrap_or("unknown time left")
                ));
            }
        }
    }

    fn on_audio(&mut self, data: &[u8], sample_rate: u32) {
        let epoch = self.epoch;
        let tx = self.events.clone();
        let result = self.pipeline.receive_audio(data, sample_rate, RESPONSE_CHANNELS, move |unit| {
            let _ = tx.send(SessionEvent::PlaybackEnded { epoch, unit });
        });

        match result {
            Ok(_) => {
                if matches!(self.status, SessionStatus::Listening | SessionStatus::Thinking) {
                    self.set_status(SessionStatus::Speaking);
                }
            }
            Err(e) => tracing::warn!(error = %e, "dropping response audio"),
        }
    }

    fn on_tool_calls(&mut self, calls: &[ToolCall]) {
        if matches!(self.status, SessionStatus::Listening | SessionStatus::Speaking) {
            self.set_status(SessionStatus::Thinking);
        }

        let results = self.tools.dispatch(calls, self.status);
        for result in &results {
            let summary = result
                .response
                .get("message")
                .or_else(|| result.response.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("done");
            let mut entry = LogEntry::new(
                LogSource::System,
                LogKind::Tool,
                format!("{}: {summary}", result.name),
            );
            if let Some(url) = result.response.get("url").and_then(|v| v.as_str()) {
                entry = entry.with_link(url);
            }
            self.log.push(entry);
        }

        if let Some(session) = &self.session
            && let Err(e) = session.send_tool_response(results)
        {
            tracing::debug!(error = %e, "tool response not sent");
        }
    }

    fn flush_transcripts(&mut self) {
        let input = std::mem::take(&mut self.input_transcript);
        if !input.trim().is_empty() {
            self.log.text(LogSource::User, input.trim());
        }
        let output = std::mem::take(&mut self.output_transcript);
        if !output.trim().is_empty() {
            self.log.text(LogSource::Assistant, output.trim());
        }
    }

    // -- devices --------------------------------------------------------------

    fn on_microphone(&mut self, mut capture: Box<dyn CaptureHandle>) {
        if self.session.is_none() {
            capture.stop();
            return;
        }
        self.pipeline.attach_capture(capture);
        tracing::info!("microphone streaming");
    }

    fn on_microphone_denied(&mut self, error: &Error) {
        tracing::error!(error = %error, "microphone unavailable");
        // Not a transport failure: no retry, no wake word restart
        self.teardown();
        self.retry = RetryState::fresh();
        self.set_status(SessionStatus::Error);
        self.log.error(format!("microphone unavailable: {error}"));
    }

    fn on_capture_frame(&mut self, samples: &[f32], sample_rate: u32) {
        if self.stopping {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let rate = self.pipeline.config().input_sample_rate;
        for chunk in self.pipeline.push_capture_frame(samples, sample_rate) {
            if let Err(e) = session.send_realtime(chunk.into_blob(rate)) {
                tracing::debug!(error = %e, "audio chunk not sent");
            }
        }
    }

    // -- screen sharing -------------------------------------------------------

    fn start_screen_share(&mut self) {
        if self.session.is_none() {
            self.log.error("start a session before sharing the screen");
            return;
        }
        if self.screen_sharing {
            return;
        }
        let Some(screen) = self.screen.clone() else {
            self.log.error("screen sharing is not available");
            return;
        };

        self.screen_sharing = true;
        let epoch = self.epoch;
        let tx = self.events.clone();
        tokio::spawn(async move {
            let event = match screen.open().await {
                Ok(capture) => SessionEvent::ScreenShareOpened { epoch, capture },
                Err(error) => SessionEvent::ScreenShareFailed { epoch, error },
            };
            let _ = tx.send(event);
        });
    }

    fn on_screen_opened(&mut self, mut capture: Box<dyn ScreenCapture>) {
        let Some(session) = self.session.clone().filter(|_| self.screen_sharing) else {
            return;
        };

        let interval = self.config.screen_frame_interval;
        let epoch = self.epoch;
        let tx = self.events.clone();
        self.timers.spawn(TimerKind::ScreenFrame, async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match capture.grab().await {
                    Ok(jpeg) => {
                        if session.send_realtime(MediaBlob::jpeg(&jpeg)).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(SessionEvent::ScreenShareFailed { epoch, error });
                        return;
                    }
                }
            }
        });
        self.log.info("screen sharing started");
    }

    fn stop_screen_share(&mut self) {
        self.timers.cancel(TimerKind::ScreenFrame);
        self.screen_sharing = false;
    }

    // -- misc -----------------------------------------------------------------

    fn send_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(session) = &self.session else {
            self.log.error("not connected; say the wake word or connect first");
            return;
        };
        match session.send_text(text) {
            Ok(()) => self.log.text(LogSource::User, text),
            Err(e) => tracing::debug!(error = %e, "text turn not sent"),
        }
    }

    fn start_gate(&mut self) {
        let ctx = GateContext {
            status: self.status,
            has_session: self.session.is_some(),
            connecting: self.retry.is_connecting,
        };
        let epoch = self.epoch;
        let tx = self.events.clone();
        self.gate.try_start(
            ctx,
            Arc::new(move || {
                let _ = tx.send(SessionEvent::WakeWordDetected { epoch });
            }),
        );
    }

    fn schedule_wake_restart(&mut self) {
        if !self.gate.is_enabled() {
            return;
        }
        self.timers.after(
            TimerKind::WakeRestart,
            self.config.wake_word_restart_delay,
            self.events.clone(),
            SessionEvent::WakeWordRestart { epoch: self.epoch },
        );
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        tracing::info!(from = %self.status, to = %status, "session status");
        self.status = status;
        self.status_tx.send_replace(status);
    }

    // -- accessors ------------------------------------------------------------

    /// Current status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Conversation log
    #[must_use]
    pub const fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Conversation log, for subscribing
    pub const fn log_mut(&mut self) -> &mut ConversationLog {
        &mut self.log
    }

    /// Retry bookkeeping
    #[must_use]
    pub const fn retry(&self) -> RetryState {
        self.retry
    }

    /// Audio pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &AudioPipeline {
        &self.pipeline
    }

    /// Wake word gate
    #[must_use]
    pub const fn gate(&self) -> &WakeWordGate {
        &self.gate
    }

    /// Whether a session handle exists
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether screen frames are being streamed or requested
    #[must_use]
    pub const fn is_screen_sharing(&self) -> bool {
        self.screen_sharing
    }

    /// Current session generation
    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Theme chosen through the `changeTheme` tool
    #[must_use]
    pub const fn theme(&self) -> ThemeMode {
        self.tools.theme()
    }
}
