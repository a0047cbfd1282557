use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One human-readable line shown to the booth operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// How long the logged operation took, when it was timed
    pub duration: Option<Duration>,
}

/// Bounded log channel with one writer side and any number of subscribers.
///
/// The newest `capacity` entries are retained for late subscribers; older
/// entries are dropped from the front. Every entry is mirrored to `tracing`.
pub struct ActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    sequence: AtomicU64,
    sender: broadcast::Sender<LogEntry>,
}

/// A registered log observer. Dropping it deregisters the observer.
pub struct LogSubscription {
    /// Entries recorded before the subscription, oldest first
    pub backlog: Vec<LogEntry>,
    pub receiver: broadcast::Receiver<LogEntry>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sequence: AtomicU64::new(0),
            sender,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record<S: Into<String>>(&self, level: LogLevel, message: S, duration: Option<Duration>) {
        let message = message.into();
        match (level, duration) {
            (LogLevel::Debug, _) => debug!("{}", message),
            (LogLevel::Info, Some(d)) => info!(elapsed_ms = d.as_millis() as u64, "{}", message),
            (LogLevel::Info, None) => info!("{}", message),
            (LogLevel::Warning, _) => warn!("{}", message),
            (LogLevel::Error, _) => error!("{}", message),
        }

        let entry = LogEntry {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            level,
            message,
            duration,
        };

        // Subscription holds the same lock while snapshotting, so no entry is
        // both in a backlog and delivered live.
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        let _ = self.sender.send(entry);
    }

    pub fn debug<S: Into<String>>(&self, message: S) {
        self.record(LogLevel::Debug, message, None);
    }

    pub fn info<S: Into<String>>(&self, message: S) {
        self.record(LogLevel::Info, message, None);
    }

    pub fn timed<S: Into<String>>(&self, message: S, duration: Duration) {
        self.record(LogLevel::Info, message, Some(duration));
    }

    pub fn warning<S: Into<String>>(&self, message: S) {
        self.record(LogLevel::Warning, message, None);
    }

    pub fn error<S: Into<String>>(&self, message: S) {
        self.record(LogLevel::Error, message, None);
    }

    pub fn subscribe(&self) -> LogSubscription {
        let entries = self.entries.lock();
        LogSubscription {
            backlog: entries.iter().cloned().collect(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
