//! Bounded linear undo/redo log
//!
//! Entries live in a deque with a cursor: everything before the cursor can
//! be undone, everything after it redone. Recording a new edit after an undo
//! discards the redo branch.
//!
//! The log is lossy: once it holds `max_history` entries, each new
//! edit evicts the oldest one, and the evicted edits can no longer be undone.

use std::collections::VecDeque;

use crate::operation::Operation;

/// One undoable step
#[derive(Debug, Clone)]
pub struct Entry {
    label: String,
    forward: Operation,
    inverse: Operation,
}

impl Entry {
    pub fn new(label: impl Into<String>, forward: Operation, inverse: Operation) -> Self {
        Self {
            label: label.into(),
            forward,
            inverse,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn forward(&self) -> &Operation {
        &self.forward
    }

    pub fn inverse(&self) -> &Operation {
        &self.inverse
    }
}

/// Edit history with an explicit cursor
#[derive(Debug, Clone)]
pub struct EditLog {
    entries: VecDeque<Entry>,
    cursor: usize,
    max_history: usize,
    saved_at: Option<usize>,
    evicted: usize,
}

impl EditLog {
    pub fn new(max_history: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_history,
            saved_at: Some(0),
            evicted: 0,
        }
    }

    /// Appends an entry, discarding the redo branch and evicting the oldest
    /// entries beyond capacity
    pub fn record(&mut self, entry: Entry) {
        if self.cursor < self.entries.len() {
            self.entries.truncate(self.cursor);
            if self.saved_at.is_some_and(|saved| saved > self.cursor) {
                self.saved_at = None;
            }
        }
        self.entries.push_back(entry);
        self.cursor += 1;

        while self.entries.len() > self.max_history {
            if let Some(dropped) = self.entries.pop_front() {
                tracing::warn!(
                    label = dropped.label(),
                    max_history = self.max_history,
                    "history_evicted"
                );
            }
            self.cursor -= 1;
            self.evicted += 1;
            self.saved_at = match self.saved_at {
                Some(0) | None => None,
                Some(saved) => Some(saved - 1),
            };
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Entry the next undo reverts
    pub fn undo_entry(&self) -> Option<&Entry> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Entry the next redo replays
    pub fn redo_entry(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }

    pub(crate) fn step_back(&mut self) {
        debug_assert!(self.can_undo());
        self.cursor -= 1;
    }

    pub(crate) fn step_forward(&mut self) {
        debug_assert!(self.can_redo());
        self.cursor += 1;
    }

    /// Menu text for the next undo, e.g. "Undo Insert 3 bytes at 0x0000000B"
    pub fn undo_description(&self) -> Option<String> {
        self.undo_entry().map(|e| format!("Undo {}", e.label()))
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_entry().map(|e| format!("Redo {}", e.label()))
    }

    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    pub fn redo_depth(&self) -> usize {
        self.entries.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Number of entries dropped by the capacity bound so far
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.saved_at = Some(0);
        self.evicted = 0;
    }

    /// Remembers the current position as the saved state
    pub fn mark_saved(&mut self) {
        self.saved_at = Some(self.cursor);
    }

    /// True unless the history sits exactly at the saved position
    pub fn is_dirty(&self) -> bool {
        self.saved_at != Some(self.cursor)
    }
}

impl Default for EditLog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> Entry {
        let forward = Operation::Write {
            address: n,
            data: vec![n as u8],
        };
        let inverse = Operation::Clear {
            start: n,
            endex: n + 1,
        };
        Entry::new(forward.describe(), forward, inverse)
    }

    #[test]
    fn test_new_log() {
        let log = EditLog::new(10);
        assert!(!log.can_undo());
        assert!(!log.can_redo());
        assert!(!log.is_dirty());
        assert_eq!(log.undo_description(), None);
    }

    #[test]
    fn test_record_and_step() {
        let mut log = EditLog::new(10);
        log.record(entry(1));
        log.record(entry(2));
        assert_eq!(log.undo_depth(), 2);
        assert_eq!(
            log.undo_description().as_deref(),
            Some("Undo Write 1 byte at 0x00000002")
        );

        log.step_back();
        assert_eq!(log.redo_depth(), 1);
        assert_eq!(
            log.redo_description().as_deref(),
            Some("Redo Write 1 byte at 0x00000002")
        );

        log.step_forward();
        assert!(!log.can_redo());
    }

    #[test]
    fn test_record_discards_redo_branch() {
        let mut log = EditLog::new(10);
        log.record(entry(1));
        log.record(entry(2));
        log.step_back();
        log.record(entry(3));
        assert_eq!(log.len(), 2);
        assert!(!log.can_redo());
        assert_eq!(log.undo_entry().unwrap().label(), "Write 1 byte at 0x00000003");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = EditLog::new(3);
        for n in 0..5 {
            log.record(entry(n));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        assert_eq!(log.undo_depth(), 3);
        log.step_back();
        log.step_back();
        log.step_back();
        assert!(!log.can_undo());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = EditLog::new(0);
        log.record(entry(1));
        assert!(log.is_empty());
        assert!(!log.can_undo());
        assert!(log.is_dirty());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut log = EditLog::new(10);
        log.record(entry(1));
        assert!(log.is_dirty());
        log.mark_saved();
        assert!(!log.is_dirty());

        log.step_back();
        assert!(log.is_dirty());
        log.step_forward();
        assert!(!log.is_dirty());

        // Saved state dropped with the redo branch
        log.step_back();
        log.record(entry(2));
        log.step_back();
        assert!(log.is_dirty());
    }

    #[test]
    fn test_dirty_after_saved_entry_evicted() {
        let mut log = EditLog::new(1);
        log.mark_saved();
        log.record(entry(1));
        log.step_back();
        assert!(!log.is_dirty());
        log.step_forward();
        log.record(entry(2));
        log.step_back();
        assert!(log.is_dirty());
    }
}
