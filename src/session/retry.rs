//! Reconnect policy for the realtime session
//!
//! One automatic retry per logical session attempt, after a fixed backoff.
//! The counter survives the retry itself and resets on a successful open, a
//! user disconnect, or a fresh user/wake-word connect.

use std::time::Duration;

use crate::error::ErrorClass;

/// Reconnect policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of automatic reconnects per attempt
    pub max_retries: u32,
    /// Delay before the reconnect is issued
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_secs(2),
        }
    }
}

/// What to do after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule a reconnect after the given delay
    Reconnect(Duration),
    /// Give up; status becomes error
    GiveUp,
    /// Not a failure; return to idle
    Ignore,
}

/// Per-attempt retry bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Automatic reconnects issued in this cycle
    pub retry_count: u32,
    /// Whether a dial is in flight
    pub is_connecting: bool,
}

impl RetryState {
    /// Fresh state for a user- or wake-word-initiated connect
    #[must_use]
    pub const fn fresh() -> Self {
        Self {
            retry_count: 0,
            is_connecting: false,
        }
    }

    /// Session opened; the cycle is over
    pub const fn opened(&mut self) {
        self.retry_count = 0;
        self.is_connecting = false;
    }

    /// Decide how to react to a failure of the given class
    ///
    /// A transient failure with retries left bumps the counter and asks for a
    /// reconnect. Everything else clears `is_connecting`.
    pub fn on_failure(&mut self, class: ErrorClass, policy: &RetryPolicy) -> RetryDecision {
        self.is_connecting = false;
        match class {
            ErrorClass::Benign => RetryDecision::Ignore,
            ErrorClass::Transient if self.retry_count < policy.max_retries => {
                self.retry_count += 1;
                RetryDecision::Reconnect(policy.backoff)
            }
            _ => RetryDecision::GiveUp,
        }
    }
}
