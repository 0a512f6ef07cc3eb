//! Append-only queue of pending log records.
//!
//! The buffer supports exactly three operations: append from any thread, take
//! everything for a flush, and put a failed batch back at the head. Each one
//! holds the lock for a constant or linear-in-batch amount of work and never
//! across an `.await`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::LogRecord;

/// Pending records awaiting shipment.
#[derive(Debug, Default)]
pub struct LogBuffer {
    records: Mutex<VecDeque<LogRecord>>,
}

impl LogBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record and returns the new length.
    pub fn push(&self, record: LogRecord) -> usize {
        let mut records = self.lock();
        records.push_back(record);
        records.len()
    }

    /// Swaps the contents out for an empty buffer.
    ///
    /// Records appended after this call land in the fresh buffer.
    #[must_use]
    pub fn take_all(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.lock()).into()
    }

    /// Puts `batch` back in front of whatever is currently buffered,
    /// preserving the batch's order.
    pub fn requeue_front(&self, batch: Vec<LogRecord>) {
        if batch.is_empty() {
            return;
        }
        let mut records = self.lock();
        let newer = std::mem::take(&mut *records);
        let mut merged = VecDeque::from(batch);
        merged.extend(newer);
        *records = merged;
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the buffered records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.lock().iter().cloned().collect()
    }
}
