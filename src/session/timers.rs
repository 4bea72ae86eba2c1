//! Abortable session timers
//!
//! Each kind holds at most one task. Arming a kind replaces (and aborts) the
//! previous task of that kind.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::event::SessionEvent;

/// Timer slots owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delayed automatic reconnect
    Reconnect,
    /// Delayed wake word gate restart
    WakeRestart,
    /// Screen frame interval loop
    ScreenFrame,
}

/// Running timer tasks
#[derive(Debug, Default)]
pub struct Timers {
    tasks: HashMap<TimerKind, AbortHandle>,
}

impl Timers {
    /// Create an empty timer set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `event` to `tx` after `delay`
    pub fn after(
        &mut self,
        kind: TimerKind,
        delay: Duration,
        tx: mpsc::UnboundedSender<SessionEvent>,
        event: SessionEvent,
    ) {
        self.spawn(kind, async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    /// Run `task` in the slot for `kind`
    pub fn spawn<F>(&mut self, kind: TimerKind, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task).abort_handle();
        if let Some(previous) = self.tasks.insert(kind, handle) {
            previous.abort();
        }
    }

    /// Abort the task for `kind`, if any
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.tasks.remove(&kind) {
            handle.abort();
            tracing::trace!(?kind, "timer cancelled");
        }
    }

    /// Abort every task
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Whether a task for `kind` is still pending
    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.tasks.get(&kind).is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new();
        timers.after(
            TimerKind::WakeRestart,
            Duration::from_millis(5),
            tx,
            SessionEvent::WakeWordRestart { epoch: 3 },
        );
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::WakeWordRestart { epoch: 3 })));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new();
        timers.after(
            TimerKind::Reconnect,
            Duration::from_millis(20),
            tx,
            SessionEvent::RetryElapsed { epoch: 1 },
        );
        assert!(timers.is_armed(TimerKind::Reconnect));
        timers.cancel(TimerKind::Reconnect);
        assert!(!timers.is_armed(TimerKind::Reconnect));
        // Sender was dropped with the aborted task
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn rearming_replaces_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new();
        timers.after(
            TimerKind::Reconnect,
            Duration::from_millis(30),
            tx.clone(),
            SessionEvent::RetryElapsed { epoch: 1 },
        );
        timers.after(
            TimerKind::Reconnect,
            Duration::from_millis(5),
            tx,
            SessionEvent::RetryElapsed { epoch: 2 },
        );
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(SessionEvent::RetryElapsed { epoch: 2 })));
        let rest = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(rest.is_none());
    }
}
