//! Inbound frame dispatch.
//!
//! Every frame from the controller is decoded as UTF-8 JSON into an
//! [`OperationRecord`] and appended to the queue. A frame that does not
//! decode is a fault: the whole queue is abandoned and the controller gets a
//! `decode_error` report.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{DECODE_ERROR_KIND, OperationRecord};
use crate::transport::FrameHandler;

use super::fault::FaultReporter;
use super::queue::OperationQueue;

// ============================================================================
// InboundDispatcher
// ============================================================================

/// Decodes inbound frames onto the operation queue.
#[derive(Clone)]
pub struct InboundDispatcher {
    queue: OperationQueue,
    faults: FaultReporter,
}

impl InboundDispatcher {
    /// Creates a dispatcher appending to `queue`.
    #[must_use]
    pub fn new(queue: OperationQueue, faults: FaultReporter) -> Self {
        Self { queue, faults }
    }

    /// Decodes `text` and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if `text` is not an operation record.
    pub fn dispatch(&self, text: &str) -> Result<()> {
        let record = OperationRecord::decode(text)?;
        debug!(op = record.op(), args = record.args().len(), "Operation queued");
        self.queue.push(record);
        Ok(())
    }

    /// Decodes a raw frame payload and enqueues it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if `payload` is not valid UTF-8 or
    /// not an operation record.
    pub fn dispatch_bytes(&self, payload: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::decode(format!("frame is not valid UTF-8: {e}")))?;
        self.dispatch(text)
    }

    /// Dispatches a frame payload, reporting fatal failures.
    pub fn handle_frame(&self, payload: &[u8]) {
        trace!(len = payload.len(), "Inbound frame");

        if let Err(e) = self.dispatch_bytes(payload) {
            if e.is_fatal() {
                self.faults.report(DECODE_ERROR_KIND, &e.to_string());
            } else {
                debug!(error = %e, "Inbound frame ignored");
            }
        }
    }

    /// Converts the dispatcher into a connection frame handler.
    #[must_use]
    pub fn into_handler(self) -> FrameHandler {
        Box::new(move |payload| self.handle_frame(payload))
    }
}

// ============================================================================
// Tests
// ============================================================================
