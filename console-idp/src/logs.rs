//! Bounded log of identity-provider lifecycle events.
//!
//! Entries are also emitted through `tracing` at the matching level, so the
//! host's logs and [`LogBuffer::recent`] agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Message
    pub message: String,
}

/// Ring buffer of log entries; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct LogBuffer {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an entry.
    pub async fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(target: "console_idp", "{}", message),
            LogLevel::Info => info!(target: "console_idp", "{}", message),
            LogLevel::Warn => warn!(target: "console_idp", "{}", message),
            LogLevel::Error => error!(target: "console_idp", "{}", message),
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message).await;
    }

    /// The most recent `n` entries, oldest first.
    ///
    /// Returns everything when `n` is zero, negative or exceeds the number of
    /// entries held.
    pub async fn recent(&self, n: i64) -> Vec<LogEntry> {
        let entries = self.entries.read().await;
        let skip = match usize::try_from(n) {
            Ok(n) if n > 0 && n < entries.len() => entries.len() - n,
            _ => 0,
        };
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
