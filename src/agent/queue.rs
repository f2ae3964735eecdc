//! Ordered operation queue.
//!
//! Shared between the inbound dispatcher (appends at the tail) and the
//! execution loop (removes the head once it settles). The queue never
//! reorders.
//!
//! Every [`OperationQueue::clear`] advances an epoch. The execution loop
//! peeks the head together with the current epoch and completes it with that
//! epoch, so a head that settles after a clear cannot remove a record that
//! was enqueued after the clear.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::OperationRecord;

// ============================================================================
// Types
// ============================================================================

/// Head of the queue as seen by the execution loop.
#[derive(Debug, Clone)]
pub struct QueueHead {
    /// Epoch at the time of the peek.
    pub epoch: u64,
    /// Copy of the head record.
    pub record: OperationRecord,
}

#[derive(Debug, Default)]
struct QueueInner {
    records: VecDeque<OperationRecord>,
    epoch: u64,
}

// ============================================================================
// OperationQueue
// ============================================================================

/// FIFO, unbounded queue of operation records.
///
/// Cheap to clone; clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct OperationQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl OperationQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record at the tail.
    pub fn push(&self, record: OperationRecord) {
        self.inner.lock().records.push_back(record);
    }

    /// Returns a copy of the head without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<QueueHead> {
        let inner = self.inner.lock();
        inner.records.front().map(|record| QueueHead {
            epoch: inner.epoch,
            record: record.clone(),
        })
    }

    /// Removes the head if no clear happened since it was peeked at `epoch`.
    pub fn complete(&self, epoch: u64) -> Option<OperationRecord> {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return None;
        }
        inner.records.pop_front()
    }

    /// Removes every record and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.epoch = inner.epoch.wrapping_add(1);
        let dropped = inner.records.len();
        inner.records.clear();
        dropped
    }

    /// Returns the number of queued records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Returns a copy of all queued records in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OperationRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn record(name: &str) -> OperationRecord {
        OperationRecord::bare(name)
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = OperationQueue::new();
        queue.push(record("a"));

        let head = queue.peek().expect("head");
        assert_eq!(head.record.op(), "a");
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.complete(head.epoch).map(|r| r.op().to_string()), Some("a".into()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_returns_count() {
        let queue = OperationQueue::new();
        for name in ["a", "b", "c"] {
            queue.push(record(name));
        }
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_stale_completion_keeps_new_records() {
        let queue = OperationQueue::new();
        queue.push(record("in-flight"));
        let head = queue.peek().expect("head");

        queue.clear();
        queue.push(record("after-clear"));

        assert!(queue.complete(head.epoch).is_none());
        assert_eq!(queue.snapshot(), vec![record("after-clear")]);
    }

    #[test]
    fn test_clones_share_state() {
        let queue = OperationQueue::new();
        let producer = queue.clone();
        producer.push(record("x"));
        assert_eq!(queue.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_fifo_order(names in proptest::collection::vec("[a-z_]{1,8}", 0..32)) {
            let queue = OperationQueue::new();
            for name in &names {
                queue.push(record(name));
            }

            let mut drained = Vec::new();
            while let Some(head) = queue.peek() {
                let removed = queue.complete(head.epoch).expect("same epoch");
                prop_assert_eq!(&removed, &head.record);
                drained.push(removed.op().to_string());
            }

            prop_assert_eq!(drained, names);
        }
    }
}
