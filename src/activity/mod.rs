//! Append-only activity trail
//!
//! The workflow engine records every transition and failure here; a caller
//! renders the entries in insertion order. Entries are never reordered,
//! batched, or mutated - the only removal is a full reset.

use chrono::Local;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One line of workflow activity.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: Uuid,
    /// Human-readable local wall-clock time.
    pub timestamp: String,
    pub message: String,
}

/// Append-only log shared between the engine task and its observers.
///
/// Clone is cheap - clones share the same entry list.
#[derive(Clone, Default)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry and return a copy of it.
    pub fn append(&self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
        };
        self.entries.lock().unwrap().push(entry.clone());
        entry
    }

    /// Copy of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Only the workflow engine calls this, on reset or
    /// when a new run starts.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let log = ActivityLog::new();
        log.append("first");
        log.append("second");
        log.append("third");

        let entries = log.snapshot();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let log = ActivityLog::new();
        let a = log.append("a");
        let b = log.append("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_reset_clears_entries() {
        let log = ActivityLog::new();
        log.append("something");
        assert!(!log.is_empty());

        log.reset();
        assert!(log.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let log = ActivityLog::new();
        let observer = log.clone();
        log.append("from engine");
        assert_eq!(observer.len(), 1);
    }
}
