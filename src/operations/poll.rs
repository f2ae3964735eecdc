//! Poll-with-timeout primitive.
//!
//! Capabilities detect completion by checking a condition on page state at a
//! fixed interval. The predicate is checked before the first sleep, so a
//! condition that already holds settles on the first poll.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{Instant, sleep};

// ============================================================================
// Constants
// ============================================================================

/// Default interval between condition checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Settlement
// ============================================================================

/// Outcome of [`await_condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The condition held.
    Settled,
    /// The timeout elapsed first.
    TimedOut,
}

impl Settlement {
    /// Returns `true` if the condition held.
    #[inline]
    #[must_use]
    pub fn is_settled(self) -> bool {
        self == Self::Settled
    }
}

// ============================================================================
// await_condition
// ============================================================================

/// Waits until `predicate` returns `true`.
///
/// With `timeout` set to `None` the wait is unbounded.
pub async fn await_condition<P>(
    mut predicate: P,
    interval: Duration,
    timeout: Option<Duration>,
) -> Settlement
where
    P: FnMut() -> bool,
{
    let started = Instant::now();

    loop {
        if predicate() {
            return Settlement::Settled;
        }

        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            return Settlement::TimedOut;
        }

        sleep(interval).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
