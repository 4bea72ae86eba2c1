//! Realtime voice session
//!
//! The [`SessionController`] state machine plus the transport it drives.

pub mod controller;
pub mod event;
pub mod gemini;
pub mod retry;
pub mod status;
pub mod timers;
pub mod transport;

pub use controller::{Backends, Flow, SessionController};
pub use event::{Epoch, SessionEvent};
pub use gemini::GeminiTransport;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use status::SessionStatus;
pub use timers::{TimerKind, Timers};
pub use transport::{
    LiveLink, LiveTransport, Outbound, ServerEvent, SessionHandle, SessionSetup, TransportEvent,
};
