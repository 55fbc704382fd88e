//! In-memory structured log buffer owned by each [`crate::flow::GraphFlow`],
//! mirrored to `tracing` so a host's existing subscriber sees the same
//! entries without needing to poll `getLogs`.

use serde_json::Value;
use std::time::Instant;
use tokio::sync::Mutex;

/// Severity of a [`LogEntry`], mirroring the `tracing` level names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

/// One recorded log line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub fields: Value,
    pub at: Instant,
}

/// The log buffer itself. Cheap to construct; intended to be held behind an
/// `Arc` alongside a `GraphFlow`.
pub struct Logger {
    entries: Mutex<Vec<LogEntry>>,
    verbose: std::sync::atomic::AtomicBool,
}

impl Default for Logger {
    fn default() -> Self {
        Logger {
            entries: Mutex::new(Vec::new()),
            verbose: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle whether `debug`-level entries are recorded. When off, debug
    /// calls are dropped at the source without allocating a `LogEntry`.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, std::sync::atomic::Ordering::Relaxed);
    }

    fn is_verbose(&self) -> bool {
        self.verbose.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn push(&self, level: Level, message: impl Into<String>, fields: Value) {
        let message = message.into();
        match level {
            Level::Error => tracing::error!(fields = %fields, "{message}"),
            Level::Warn => tracing::warn!(fields = %fields, "{message}"),
            Level::Info => tracing::info!(fields = %fields, "{message}"),
            Level::Debug => tracing::debug!(fields = %fields, "{message}"),
        }
        self.entries.lock().await.push(LogEntry {
            level,
            message,
            fields,
            at: Instant::now(),
        });
    }

    pub async fn error(&self, message: impl Into<String>, fields: Value) {
        self.push(Level::Error, message, fields).await;
    }

    pub async fn warn(&self, message: impl Into<String>, fields: Value) {
        self.push(Level::Warn, message, fields).await;
    }

    pub async fn info(&self, message: impl Into<String>, fields: Value) {
        self.push(Level::Info, message, fields).await;
    }

    /// Record a debug entry, but only if verbose logging is enabled.
    pub async fn debug(&self, message: impl Into<String>, fields: Value) {
        if self.is_verbose() {
            self.push(Level::Debug, message, fields).await;
        }
    }

    /// Snapshot of all entries recorded so far.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }

    /// Discard all recorded entries.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
