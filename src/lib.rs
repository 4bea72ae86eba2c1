//! Beacon Live - realtime voice assistant client
//!
//! This library provides the session and audio lifecycle for a voice
//! assistant that talks to a realtime conversational service:
//! - Live audio pipeline (capture, resample, chunk, gapless playback)
//! - Session state machine with a single automatic reconnect
//! - Wake word gate that starts sessions hands-free
//! - Client-side tools the model can call (open URLs, search, theme, status)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Devices / Wake word / CLI              │
//! │   Microphone  │  Speakers  │  Screen  │  stdin      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ SessionEvent queue
//! ┌────────────────────▼────────────────────────────────┐
//! │                 SessionController                    │
//! │   Pipeline  │  Retry  │  Timers  │  Tools  │  Log    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ LiveTransport
//! ┌────────────────────▼────────────────────────────────┐
//! │            Gemini Live (WebSocket)                   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod screen;
pub mod session;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use error::{Error, ErrorClass, Result, TransportError, TransportErrorKind};
pub use log::{ConversationLog, LogEntry, LogKind, LogSource};
pub use session::{Backends, SessionController, SessionEvent, SessionStatus};
