//! Execution loop.
//!
//! Runs queued operations strictly in order, one at a time. Each tick looks
//! at the head of the queue, awaits its capability to settle, and only then
//! removes it. A new invocation never starts before the previous settlement
//! has been observed.
//!
//! | Head | Outcome | Queue |
//! |------|---------|-------|
//! | none | [`TickOutcome::Idle`] | unchanged |
//! | unknown name | [`TickOutcome::Unknown`] | head removed |
//! | capability `Ok` | [`TickOutcome::Completed`] | head removed |
//! | capability `Err` | [`TickOutcome::Failed`] | head removed |
//! | capability panics | [`TickOutcome::Faulted`] | cleared, error frame sent |

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::operations::OperationTable;
use crate::protocol::EXECUTION_PANIC_KIND;

use super::fault::FaultReporter;
use super::queue::OperationQueue;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// TickOutcome
// ============================================================================

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty.
    Idle,
    /// Head settled successfully.
    Completed,
    /// Head failed and was discarded.
    Failed,
    /// No capability for the head's name; discarded.
    Unknown,
    /// Capability panicked; queue cleared and reported.
    Faulted,
}

// ============================================================================
// ExecutionLoop
// ============================================================================

/// Single-flight FIFO executor over an [`OperationTable`].
#[derive(Clone)]
pub struct ExecutionLoop {
    queue: OperationQueue,
    table: OperationTable,
    faults: FaultReporter,
    tick_interval: Duration,
}

impl ExecutionLoop {
    /// Creates a loop draining `queue` through `table`.
    #[must_use]
    pub fn new(
        queue: OperationQueue,
        table: OperationTable,
        faults: FaultReporter,
        tick_interval: Duration,
    ) -> Self {
        Self {
            queue,
            table,
            faults,
            tick_interval,
        }
    }

    /// Processes at most one operation.
    pub async fn tick(&self) -> TickOutcome {
        let Some(head) = self.queue.peek() else {
            return TickOutcome::Idle;
        };
        let op = head.record.op();

        let Some(capability) = self.table.get(op) else {
            error!(op, "Operation not found");
            self.queue.complete(head.epoch);
            return TickOutcome::Unknown;
        };

        debug!(op, args = head.record.args().len(), "Executing");

        let settled = AssertUnwindSafe(capability.invoke(head.record.args()))
            .catch_unwind()
            .await;

        let outcome = match settled {
            Ok(Ok(())) => {
                debug!(op, "Operation completed");
                TickOutcome::Completed
            }
            Ok(Err(e)) => {
                warn!(op, error = %e, "Operation failed");
                TickOutcome::Failed
            }
            Err(payload) => {
                let message = format!("{op}: {}", panic_message(payload.as_ref()));
                self.faults.report(EXECUTION_PANIC_KIND, &message);
                return TickOutcome::Faulted;
            }
        };

        if self.queue.complete(head.epoch).is_none() {
            debug!(op, "Queue cleared while operation was running");
        }
        outcome
    }

    /// Ticks forever at the configured interval.
    ///
    /// A slow operation delays the next tick instead of causing a burst.
    pub async fn run(self) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            operations = self.table.len(),
            "Execution loop started"
        );

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

/// Extracts the message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}

// ============================================================================
// Tests
// ============================================================================
