//! Human-readable activity log shown to the user.
//!
//! Separate from the tracing file log: this is the short, capped list of
//! state changes and publish attempts the front end renders and can export.

use chrono::Local;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub time: String,
    pub msg: String,
}

/// Most-recent-first list capped at [`MAX_LOG_ENTRIES`].
#[derive(Debug, Default)]
pub struct LogBook {
    entries: VecDeque<LogEntry>,
    seq: u64,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: impl Into<String>) -> LogEntry {
        let now = Local::now();
        self.seq += 1;
        let entry = LogEntry {
            id: format!(
                "{:x}-{:x}-{:04x}",
                now.timestamp_millis(),
                self.seq,
                rand::thread_rng().gen::<u16>()
            ),
            time: now.format("%H:%M:%S").to_string(),
            msg: msg.into(),
        };
        self.entries.push_front(entry.clone());
        self.entries.truncate(MAX_LOG_ENTRIES);
        entry
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Write the log oldest-first, one `[time] msg` line per entry.
    /// Returns the number of lines written.
    pub fn export(&self, path: &Path) -> anyhow::Result<usize> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = String::new();
        for entry in self.entries.iter().rev() {
            out.push_str(&format!("[{}] {}\n", entry.time, entry.msg));
        }
        std::fs::write(path, out)?;
        Ok(self.entries.len())
    }
}

/// Cloneable handle to the shared [`LogBook`].
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    book: Arc<Mutex<LogBook>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, LogBook> {
        // A panic while holding the lock cannot leave the deque invalid.
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a line for the user and mirror it to the tracing log.
    pub fn record(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(target: "activity", "{}", msg);
        self.book().push(msg);
    }

    /// Append without mirroring; used by the tracing layer that forwards
    /// warnings, which are already in the file log.
    pub fn push_raw(&self, msg: impl Into<String>) {
        self.book().push(msg);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.book().entries()
    }

    pub fn clear(&self) {
        self.book().clear();
    }

    pub fn export(&self, path: &Path) -> anyhow::Result<usize> {
        self.book().export(path)
    }
}
