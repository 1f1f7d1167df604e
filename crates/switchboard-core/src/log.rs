//! Application-level event log with live monitor fan-out.
//!
//! Distinct from `tracing`: these entries are part of the product surface.
//! They are retained in memory for the diagnostics endpoint and pushed live
//! to any attached monitor channels.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One logged relay event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Origin of the event (`client`, `server`, `extension`, `upstream`).
    pub source: String,
    /// Event type (e.g. `audio_recording`, `parse_error`).
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Structured payload.
    pub data: Value,
    /// ISO-8601 timestamp.
    pub timestamp: String,
}

impl LogEntry {
    /// Build an entry stamped with the current UTC time.
    pub fn new(source: impl Into<String>, entry_type: impl Into<String>, data: Value) -> Self {
        Self {
            source: source.into(),
            entry_type: entry_type.into(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// In-memory event log.
///
/// Appends are retained up to a cap (oldest entries dropped first) and
/// simultaneously fanned out over a broadcast channel. Logging with zero
/// subscribers is fine; the fan-out is best-effort.
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: usize,
    sink: broadcast::Sender<LogEntry>,
}

impl EventLog {
    /// Create a log retaining at most `max_entries` entries.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        let (sink, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries,
            sink,
        }
    }

    /// Append an event and fan it out to monitor subscribers.
    pub fn log(&self, source: impl Into<String>, entry_type: impl Into<String>, data: Value) {
        let entry = LogEntry::new(source, entry_type, data);
        tracing::debug!(
            source = %entry.source,
            event = %entry.entry_type,
            "relay event"
        );
        {
            let mut entries = self.entries.lock();
            if entries.len() == self.max_entries {
                let _ = entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        // Err just means no monitor is attached right now.
        let _ = self.sink.send(entry);
    }

    /// Snapshot of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Subscribe to live entries.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sink.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}
