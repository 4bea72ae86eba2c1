//! Shared test utilities
//!
//! Scripted stand-ins for every controller backend plus a harness that pumps
//! the controller's event queue the way `SessionController::run` does.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_live::config::SessionConfig;
use beacon_live::screen::{ScreenCapture, ScreenSource};
use beacon_live::session::{
    LiveLink, LiveTransport, Outbound, SessionHandle, SessionSetup, TransportEvent,
};
use beacon_live::tools::UrlOpener;
use beacon_live::voice::{
    AudioBuffer, AudioOutput, CaptureHandle, DetectionCallback, FrameSink, Microphone,
    PlaybackEnd, PlaybackUnit, WakeWordEngine,
};
use beacon_live::{
    Backends, Error, Result, SessionController, SessionEvent, SessionStatus, TransportError,
    TransportErrorKind,
};
use tokio::sync::mpsc;

/// How long a pump waits for the next event before giving up
const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Session tunables shrunk to test scale
#[must_use]
pub fn test_config() -> SessionConfig {
    SessionConfig {
        chunk_samples: 1024,
        reconnect_backoff: Duration::from_millis(10),
        wake_word_restart_delay: Duration::from_millis(10),
        screen_frame_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

// -- transport ----------------------------------------------------------------

/// Test side of one opened link
pub struct FakeLink {
    /// Feed server events to the controller
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
    /// Frames the controller sent
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl FakeLink {
    /// Drain everything sent so far
    pub fn sent(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Transport that answers connects from a script; opens once the script is empty
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Option<TransportErrorKind>>>,
    connects: AtomicUsize,
    links: Mutex<Vec<FakeLink>>,
}

impl FakeTransport {
    /// Transport whose next connects fail with `failures`, in order
    #[must_use]
    pub fn failing(failures: &[TransportErrorKind]) -> Arc<Self> {
        let transport = Self::default();
        transport
            .script
            .lock()
            .unwrap()
            .extend(failures.iter().copied().map(Some));
        Arc::new(transport)
    }

    /// Transport that always opens
    #[must_use]
    pub fn open() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of connect attempts
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of links opened
    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// Push a server event on link `index`
    pub fn push(&self, index: usize, event: TransportEvent) {
        let links = self.links.lock().unwrap();
        links[index].inbound.send(event).unwrap();
    }

    /// Frames the controller sent on link `index`
    pub fn sent(&self, index: usize) -> Vec<Outbound> {
        self.links.lock().unwrap()[index].sent()
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(&self, _setup: &SessionSetup) -> Result<LiveLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().flatten();
        if let Some(kind) = next {
            return Err(TransportError::new(kind, "scripted failure").into());
        }

        let (handle, outbound) = SessionHandle::channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        self.links.lock().unwrap().push(FakeLink {
            inbound: inbound_tx,
            outbound,
        });
        Ok(LiveLink { handle, inbound })
    }
}

// -- microphone ---------------------------------------------------------------

/// Microphone that hands frames in from the test
#[derive(Default)]
pub struct FakeMicrophone {
    deny: AtomicBool,
    opens: AtomicUsize,
    stops: Arc<AtomicUsize>,
    sink: Mutex<Option<FrameSink>>,
}

impl FakeMicrophone {
    /// Microphone that grants access
    #[must_use]
    pub fn granted() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Microphone that refuses access
    #[must_use]
    pub fn denied() -> Arc<Self> {
        let mic = Self::default();
        mic.deny.store(true, Ordering::SeqCst);
        Arc::new(mic)
    }

    /// Number of open requests
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of captures stopped
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Deliver a frame to the most recent subscriber
    pub fn emit(&self, samples: Vec<f32>, sample_rate: u32) {
        let sink = self.sink.lock().unwrap().clone().expect("microphone not open");
        sink(samples, sample_rate);
    }
}

struct FakeCapture {
    stops: Arc<AtomicUsize>,
    stopped: bool,
}

impl CaptureHandle for FakeCapture {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn open(&self, sink: FrameSink) -> Result<Box<dyn CaptureHandle>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::Permission("microphone access denied".to_string()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(FakeCapture {
            stops: Arc::clone(&self.stops),
            stopped: false,
        }))
    }
}

// -- speaker ------------------------------------------------------------------

#[derive(Default)]
struct SpeakerState {
    now: f64,
    units: Vec<PlaybackUnit>,
    pending: Vec<PlaybackEnd>,
    stops: usize,
}

/// Test handle onto a [`FakeOutput`]
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    state: Arc<Mutex<SpeakerState>>,
}

impl FakeSpeaker {
    /// Output to hand to the controller
    #[must_use]
    pub fn output(&self) -> Box<dyn AudioOutput> {
        Box::new(FakeOutput {
            state: Arc::clone(&self.state),
        })
    }

    /// Units queued so far
    pub fn units(&self) -> Vec<PlaybackUnit> {
        self.state.lock().unwrap().units.clone()
    }

    /// Number of `stop_all` calls
    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    /// Move the output clock
    pub fn set_now(&self, now: f64) {
        self.state.lock().unwrap().now = now;
    }

    /// Let every queued unit finish naturally
    pub fn finish_all(&self) {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        for on_end in pending {
            on_end();
        }
    }
}

struct FakeOutput {
    state: Arc<Mutex<SpeakerState>>,
}

impl AudioOutput for FakeOutput {
    fn now(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn play(&mut self, unit: &PlaybackUnit, _: AudioBuffer, on_end: PlaybackEnd) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.units.push(*unit);
        state.pending.push(on_end);
        Ok(())
    }

    fn stop_all(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.stops += 1;
    }
}

// -- wake word ----------------------------------------------------------------

#[derive(Default)]
struct WakeState {
    starts: usize,
    stops: usize,
    callback: Option<DetectionCallback>,
}

/// Test handle onto a scripted wake word engine
#[derive(Clone, Default)]
pub struct FakeWake {
    state: Arc<Mutex<WakeState>>,
}

impl FakeWake {
    /// Engine to hand to the controller
    #[must_use]
    pub fn engine(&self) -> Box<dyn WakeWordEngine> {
        Box::new(FakeWakeEngine {
            state: Arc::clone(&self.state),
        })
    }

    /// Number of engine starts
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    /// Number of engine stops
    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    /// Pretend the keyword was heard
    pub fn trigger(&self) {
        let callback = self.state.lock().unwrap().callback.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct FakeWakeEngine {
    state: Arc<Mutex<WakeState>>,
}

impl WakeWordEngine for FakeWakeEngine {
    fn start(&mut self, on_detect: DetectionCallback) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.starts += 1;
        state.callback = Some(on_detect);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.callback = None;
    }
}

// -- opener / screen ----------------------------------------------------------

/// Records opened URLs
#[derive(Default)]
pub struct FakeOpener {
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeOpener {
    /// Opener that always succeeds
    #[must_use]
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opener whose launches always fail
    #[must_use]
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// URLs opened so far
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for FakeOpener {
    fn open(&self, url: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Tool("no browser".to_string()));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Screen source that grants or denies display access
pub struct FakeScreen {
    deny: bool,
}

impl FakeScreen {
    /// Source that hands out a fixed frame
    #[must_use]
    pub fn granted() -> Arc<Self> {
        Arc::new(Self { deny: false })
    }

    /// Source that refuses access
    #[must_use]
    pub fn denied() -> Arc<Self> {
        Arc::new(Self { deny: true })
    }
}

struct FakeFrames;

#[async_trait]
impl ScreenCapture for FakeFrames {
    async fn grab(&mut self) -> Result<Vec<u8>> {
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }
}

#[async_trait]
impl ScreenSource for FakeScreen {
    async fn open(&self) -> Result<Box<dyn ScreenCapture>> {
        if self.deny {
            return Err(Error::Permission("display capture denied".to_string()));
        }
        Ok(Box::new(FakeFrames))
    }
}

// -- harness ------------------------------------------------------------------

/// Which fakes a harness is built from
pub struct Fakes {
    pub transport: Option<Arc<FakeTransport>>,
    pub microphone: Arc<FakeMicrophone>,
    pub wake: Option<FakeWake>,
    pub screen: Arc<FakeScreen>,
    pub opener: Arc<FakeOpener>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            transport: Some(FakeTransport::open()),
            microphone: FakeMicrophone::granted(),
            wake: None,
            screen: FakeScreen::granted(),
            opener: FakeOpener::working(),
        }
    }
}

/// A controller wired to fakes, with its event queue
pub struct Harness {
    pub controller: SessionController,
    pub rx: mpsc::UnboundedReceiver<SessionEvent>,
    pub transport: Option<Arc<FakeTransport>>,
    pub microphone: Arc<FakeMicrophone>,
    pub speaker: FakeSpeaker,
    pub wake: Option<FakeWake>,
    pub opener: Arc<FakeOpener>,
    /// Every status the controller passed through, in order
    pub history: Vec<SessionStatus>,
}

impl Harness {
    /// Controller over the default fakes
    #[must_use]
    pub fn new() -> Self {
        Self::with(Fakes::default())
    }

    /// Controller over the given fakes
    #[must_use]
    pub fn with(fakes: Fakes) -> Self {
        let speaker = FakeSpeaker::default();
        let backends = Backends {
            transport: fakes
                .transport
                .clone()
                .map(|t| t as Arc<dyn LiveTransport>),
            microphone: Arc::clone(&fakes.microphone) as Arc<dyn Microphone>,
            output: speaker.output(),
            wake_word: fakes.wake.as_ref().map(FakeWake::engine),
            screen: Some(Arc::clone(&fakes.screen) as Arc<dyn ScreenSource>),
            opener: Arc::clone(&fakes.opener) as Arc<dyn UrlOpener>,
        };
        let (controller, rx) = SessionController::new(test_config(), backends);
        Self {
            controller,
            rx,
            transport: fakes.transport,
            microphone: fakes.microphone,
            speaker,
            wake: fakes.wake,
            opener: fakes.opener,
            history: vec![SessionStatus::Idle],
        }
    }

    /// The scripted transport
    pub fn transport(&self) -> &FakeTransport {
        self.transport.as_deref().expect("harness has no transport")
    }

    /// The wake word engine handle
    pub fn wake(&self) -> &FakeWake {
        self.wake.as_ref().expect("harness has no wake word engine")
    }

    /// Apply one event directly
    pub fn handle(&mut self, event: SessionEvent) {
        self.controller.handle(event);
        self.record();
    }

    fn record(&mut self) {
        let status = self.controller.status();
        if self.history.last() != Some(&status) {
            self.history.push(status);
        }
    }

    /// Handle the next queued event; `false` if none arrived in time
    pub async fn step(&mut self, wait: Duration) -> bool {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => {
                self.handle(event);
                true
            }
            _ => false,
        }
    }

    /// Handle events until `done` holds; panics if the queue goes quiet first
    pub async fn pump_until(&mut self, done: impl Fn(&Self) -> bool) {
        while !done(self) {
            assert!(
                self.step(STEP_TIMEOUT).await,
                "no event arrived; status {}",
                self.controller.status()
            );
        }
    }

    /// Handle whatever arrives within `window`
    pub async fn settle(&mut self, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() || !self.step(left).await {
                return;
            }
        }
    }

    /// Connect and wait until the microphone is streaming
    pub async fn connect(&mut self) {
        self.handle(SessionEvent::Connect);
        self.pump_until(|h| {
            h.controller.status() == SessionStatus::Listening && h.controller.pipeline().is_capturing()
        })
        .await;
    }

    /// Feed a server event on the newest link
    pub fn server(&self, event: TransportEvent) {
        let transport = self.transport();
        transport.push(transport.link_count() - 1, event);
    }

    /// Frames sent on the newest link
    pub fn sent(&self) -> Vec<Outbound> {
        let transport = self.transport();
        transport.sent(transport.link_count() - 1)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
