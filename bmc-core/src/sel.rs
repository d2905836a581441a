//! System Event Log: a bounded ring of timestamped diagnostic entries
//!
//! Backed by a `VecDeque` so eviction at capacity is O(1) (`pop_front`)
//! instead of a full-buffer shift.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::sel as sel_consts;

/// Entry severity. Ordering matches IPMI convention: higher is worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn wire_tag(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

/// A single log entry. `id` is a monotonically increasing counter, not reused
/// after eviction, so clients can detect gaps. Starts at 1, per the reference
/// implementation's `sel_init` (0 is never a valid assigned id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelEntry {
    pub id: u32,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    pub timestamp: u64,
}

/// Bounded event log. Holds at most `constants::sel::MAX_ENTRIES` entries;
/// pushing past capacity evicts the oldest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    entries: VecDeque<SelEntry>,
    next_id: u32,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(sel_consts::MAX_ENTRIES),
            next_id: 1,
        }
    }

    /// Append a new entry, truncating `source`/`message` to their maximum
    /// lengths and evicting the oldest entry if the log is already full.
    /// Returns the assigned id.
    pub fn add(&mut self, severity: Severity, source: impl Into<String>, message: impl Into<String>, timestamp: u64) -> u32 {
        let mut source = source.into();
        source.truncate(sel_consts::MAX_SOURCE_LEN);
        let mut message = message.into();
        message.truncate(sel_consts::MAX_MESSAGE_LEN);

        if self.entries.len() >= sel_consts::MAX_ENTRIES {
            self.entries.pop_front();
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.entries.push_back(SelEntry {
            id,
            severity,
            source,
            message,
            timestamp,
        });

        id
    }

    /// Look up an entry by id. Entries are evicted in FIFO order so an id
    /// older than the oldest surviving entry returns `None`.
    pub fn get(&self, id: u32) -> Option<&SelEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> &VecDeque<SelEntry> {
        &self.entries
    }

    /// Whether the most recently appended entry was `Critical`. Used by the
    /// control loop to decide whether a SEL snapshot save is due immediately
    /// rather than at the next scheduled interval.
    pub fn last_is_critical(&self) -> bool {
        self.entries.back().map(|e| e.severity == Severity::Critical).unwrap_or(false)
    }

    /// Build the on-disk SEL snapshot shape: `{entries, count}`.
    pub fn snapshot(&self) -> SelSnapshot {
        SelSnapshot {
            entries: self.entries.iter().cloned().collect(),
            count: self.entries.len(),
        }
    }
}

/// The SEL file's on-disk shape (`/tmp/bmc_sel.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelSnapshot {
    pub entries: Vec<SelEntry>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_is_assigned_id_one() {
        let mut log = EventLog::new();
        let id = log.add(Severity::Info, "test", "first", 1);
        assert_eq!(id, 1);
    }

    #[test]
    fn ids_are_assigned_in_increasing_order() {
        let mut log = EventLog::new();
        let a = log.add(Severity::Info, "test", "first", 1);
        let b = log.add(Severity::Info, "test", "second", 2);
        assert!(b > a);
    }

    #[test]
    fn ring_overflow_evicts_the_oldest_forty_four_of_three_hundred_entries() {
        let mut log = EventLog::new();
        for i in 0..300 {
            log.add(Severity::Info, "test", format!("entry {}", i), i as u64);
        }
        assert_eq!(log.len(), sel_consts::MAX_ENTRIES);

        // 300 appends starting at id 1 assign ids 1..=300; the ring holds the
        // most recent 256, so ids 1..=44 are gone and 45..=300 survive.
        for evicted in 1..=44 {
            assert!(log.get(evicted).is_none(), "id {} should have been evicted", evicted);
        }
        for surviving in 45..=300 {
            assert!(log.get(surviving).is_some(), "id {} should still be present", surviving);
        }

        let next = log.add(Severity::Info, "test", "entry 300", 300);
        assert_eq!(next, 301);
    }

    #[test]
    fn evicts_oldest_entry_once_full() {
        let mut log = EventLog::new();
        for i in 0..sel_consts::MAX_ENTRIES {
            log.add(Severity::Info, "test", format!("entry {}", i), i as u64);
        }
        assert_eq!(log.len(), sel_consts::MAX_ENTRIES);

        let first_id = log.all().front().unwrap().id;
        log.add(Severity::Info, "test", "overflow", 999);

        assert_eq!(log.len(), sel_consts::MAX_ENTRIES);
        assert!(log.get(first_id).is_none());
    }

    #[test]
    fn truncates_overlong_source_and_message() {
        let mut log = EventLog::new();
        let long_source = "x".repeat(100);
        let long_message = "y".repeat(500);
        let id = log.add(Severity::Warning, long_source, long_message, 1);

        let entry = log.get(id).unwrap();
        assert!(entry.source.len() <= sel_consts::MAX_SOURCE_LEN);
        assert!(entry.message.len() <= sel_consts::MAX_MESSAGE_LEN);
    }

    #[test]
    fn last_is_critical_tracks_the_most_recent_entry() {
        let mut log = EventLog::new();
        log.add(Severity::Info, "test", "ok", 1);
        assert!(!log.last_is_critical());
        log.add(Severity::Critical, "test", "uh oh", 2);
        assert!(log.last_is_critical());
    }
}
