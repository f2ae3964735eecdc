//! Fault reporting.
//!
//! A fault abandons every pending operation and tells the controller once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{error, warn};

use crate::protocol::error_frame;
use crate::transport::{FrameSink, SendOutcome};

use super::queue::OperationQueue;

// ============================================================================
// FaultReporter
// ============================================================================

/// Clears the queue and sends one error frame per fault.
#[derive(Clone)]
pub struct FaultReporter {
    queue: OperationQueue,
    sink: Arc<dyn FrameSink>,
}

impl FaultReporter {
    /// Creates a reporter over `queue`, reporting through `sink`.
    #[must_use]
    pub fn new(queue: OperationQueue, sink: Arc<dyn FrameSink>) -> Self {
        Self { queue, sink }
    }

    /// Handles one fault of the given kind.
    ///
    /// The error frame is dropped if no connection is open.
    pub fn report(&self, kind: &str, message: &str) -> SendOutcome {
        let dropped = self.queue.clear();
        error!(kind, message, dropped, "Fault, operation queue cleared");

        let outcome = self.sink.try_send(error_frame(kind, message));
        if !outcome.is_delivered() {
            warn!(kind, "Error frame dropped, no open connection");
        }
        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================
