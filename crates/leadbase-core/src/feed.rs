//! Bounded in-memory activity feed for the dashboard status panel.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line in the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Fixed-capacity ring buffer of status lines.
///
/// Owned by the serving component and injected into whatever produces
/// entries. Eviction policy: once full, pushing drops the oldest entry.
#[derive(Debug)]
pub struct ActivityFeed {
    capacity: usize,
    entries: Mutex<VecDeque<FeedEntry>>,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, message: impl Into<String>) {
        let entry = FeedEntry {
            at: Utc::now(),
            message: message.into(),
        };
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest entries first.
    pub fn recent(&self) -> Vec<FeedEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_entries_in_insertion_order() {
        let feed = ActivityFeed::new(8);
        feed.push("first");
        feed.push("second");
        let recent = feed.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].message, "first");
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let feed = ActivityFeed::new(3);
        for n in 0..5 {
            feed.push(format!("entry {n}"));
        }
        let recent = feed.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "entry 4");
        assert_eq!(recent[2].message, "entry 2");
    }

    #[test]
    fn capacity_floor_is_one() {
        let feed = ActivityFeed::new(0);
        feed.push("only");
        feed.push("replaced");
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.recent()[0].message, "replaced");
    }
}
