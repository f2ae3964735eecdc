//! Outbound frame sink.
//!
//! Everything the agent sends to the controller goes through
//! [`FrameSink::try_send`]: fire-and-forget, with an explicit outcome so
//! callers (and tests) can see when a frame was dropped.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

// ============================================================================
// SendOutcome
// ============================================================================

/// Result of one [`FrameSink::try_send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to an open connection.
    Delivered,
    /// No open connection; the frame was discarded.
    Dropped,
}

impl SendOutcome {
    /// Returns `true` if the frame was handed to an open connection.
    #[inline]
    #[must_use]
    pub fn is_delivered(self) -> bool {
        self == Self::Delivered
    }
}

// ============================================================================
// FrameSink
// ============================================================================

/// Destination for outbound frames.
pub trait FrameSink: Send + Sync {
    /// Sends `bytes` as one frame if possible, never blocking or queueing.
    fn try_send(&self, bytes: Vec<u8>) -> SendOutcome;
}

// ============================================================================
// MemorySink
// ============================================================================

/// Sink that records delivered frames in memory.
///
/// Starts open; [`MemorySink::set_open`] simulates a disconnect. Frames sent
/// while closed are counted as dropped and not recorded.
#[derive(Debug)]
pub struct MemorySink {
    open: AtomicBool,
    frames: Mutex<Vec<Vec<u8>>>,
    attempts: AtomicUsize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// Creates an open sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Creates a closed sink.
    #[must_use]
    pub fn closed() -> Self {
        let sink = Self::new();
        sink.set_open(false);
        sink
    }

    /// Opens or closes the sink.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Frames delivered so far, in order.
    #[must_use]
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// Number of `try_send` calls, delivered or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl FrameSink for MemorySink {
    fn try_send(&self, bytes: Vec<u8>) -> SendOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            return SendOutcome::Dropped;
        }
        self.frames.lock().push(bytes);
        SendOutcome::Delivered
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_when_open() {
        let sink = MemorySink::new();
        assert_eq!(sink.try_send(b"a".to_vec()), SendOutcome::Delivered);
        assert_eq!(sink.frames(), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_memory_sink_drops_when_closed() {
        let sink = MemorySink::closed();
        let outcome = sink.try_send(b"a".to_vec());
        assert!(!outcome.is_delivered());
        assert!(sink.frames().is_empty());
        assert_eq!(sink.attempts(), 1);
    }
}
