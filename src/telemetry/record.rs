//! # Telemetry Records
//!
//! A [`Record`] holds the latest value of one telemetry stream together with
//! its update bookkeeping:
//!
//! - a sequence number incremented on every write,
//! - the local time (ms) of the last write,
//! - an `updated` flag set by the writer and cleared by a reader's
//!   [`Record::acknowledge`].
//!
//! The flag is a single shared mailbox. Readers that need their own view of
//! "new since I last looked" keep a [`ReadCursor`] per record instead.

use serde::Serialize;

/// Latest value of a telemetry stream
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record<T> {
    value: T,
    sequence: u64,
    last_update_ms: Option<u64>,
    updated: bool,
}

impl<T> Record<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Written since the last [`Record::acknowledge`]
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Local time of the last write, `None` if never written
    pub fn last_update_time(&self) -> Option<u64> {
        self.last_update_ms
    }

    /// Number of writes so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Last write happened less than `window_ms` before `now_ms`
    pub fn is_fresh(&self, now_ms: u64, window_ms: u64) -> bool {
        self.last_update_ms
            .map_or(false, |t| t.saturating_add(window_ms) > now_ms)
    }

    /// Time since the last write, `None` if never written
    pub fn age(&self, now_ms: u64) -> Option<u64> {
        self.last_update_ms.map(|t| now_ms.saturating_sub(t))
    }

    /// Clear the updated flag
    pub fn acknowledge(&mut self) {
        self.updated = false;
    }

    /// Apply a write. Timestamps never go backwards.
    pub(crate) fn update(&mut self, now_ms: u64, apply: impl FnOnce(&mut T)) {
        apply(&mut self.value);
        self.sequence += 1;
        self.last_update_ms = Some(self.last_update_ms.map_or(now_ms, |t| t.max(now_ms)));
        self.updated = true;
    }
}

/// Per-reader position in a record's update sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCursor {
    seen: u64,
}

impl ReadCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor that treats the record's current value as already seen
    pub fn at<T>(record: &Record<T>) -> Self {
        Self { seen: record.sequence() }
    }

    /// Record has been written since this cursor last polled it
    pub fn has_update<T>(&self, record: &Record<T>) -> bool {
        record.sequence() > self.seen
    }

    /// Return the value if it is new to this reader and mark it seen
    pub fn poll<'a, T>(&mut self, record: &'a Record<T>) -> Option<&'a T> {
        if !self.has_update(record) {
            return None;
        }
        self.seen = record.sequence();
        Some(record.value())
    }
}
