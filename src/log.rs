//! Conversation log
//!
//! Append-only record of what the user and assistant said and what the
//! client did. Every entry is mirrored into `tracing` and can be forwarded to
//! a UI subscriber.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Who produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// The person speaking
    User,
    /// The model
    Assistant,
    /// This client
    System,
}

/// What an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Spoken or typed text
    Text,
    /// A tool invocation
    Tool,
    /// A failure surfaced to the user
    Error,
    /// Status information
    Info,
}

/// One log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Producer
    pub source: LogSource,
    /// Category
    pub kind: LogKind,
    /// Human-readable text
    pub message: String,
    /// Optional URL the entry refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped now
    pub fn new(source: LogSource, kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            kind,
            message: message.into(),
            link: None,
        }
    }

    /// Attach a link
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Insertion-ordered entry list
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
    subscriber: Option<mpsc::UnboundedSender<LogEntry>>,
}

impl ConversationLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every future entry to the returned receiver
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<LogEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        rx
    }

    /// Append an entry
    pub fn push(&mut self, entry: LogEntry) {
        let source = entry.source;
        let link = entry.link.as_deref().unwrap_or_default();
        match entry.kind {
            LogKind::Error => tracing::warn!(?source, message = %entry.message, "conversation error"),
            LogKind::Tool => tracing::info!(?source, message = %entry.message, link, "tool"),
            LogKind::Text => tracing::info!(?source, message = %entry.message, "said"),
            LogKind::Info => tracing::debug!(?source, message = %entry.message, "info"),
        }

        let delivered = self
            .subscriber
            .as_ref()
            .is_none_or(|tx| tx.send(entry.clone()).is_ok());
        if !delivered {
            self.subscriber = None;
        }
        self.entries.push(entry);
    }

    /// Record a system status message
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogSource::System, LogKind::Info, message));
    }

    /// Record a failure shown to the user
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(LogSource::System, LogKind::Error, message));
    }

    /// Record text from `source`
    pub fn text(&mut self, source: LogSource, message: impl Into<String>) {
        self.push(LogEntry::new(source, LogKind::Text, message));
    }

    /// All entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries of one kind
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}
