//! Persistent WebSocket connection to the control server.
//!
//! The [`ConnectionManager`] owns exactly one socket at a time. It spawns a
//! tokio task that:
//!
//! - connects to the configured URL,
//! - sends the ping frame as soon as the socket is open,
//! - hands every inbound frame to the registered [`FrameHandler`],
//! - drains outbound frames queued by [`ConnectionManager::try_send`],
//! - on close or error waits the fixed reconnect delay and starts over.
//!
//! Each attempt installs a fresh [`LiveConnection`] in the slot, replacing
//! the previous one. Cleanup compares [`ConnectionId`]s so a finished attempt
//! never clears its successor.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::identifiers::ConnectionId;
use crate::protocol::ping_frame;

use super::sink::{FrameSink, SendOutcome};

// ============================================================================
// Constants
// ============================================================================

/// Delay between losing a connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the payload of every inbound text or binary frame.
///
/// Payloads are passed through unchanged. UTF-8 validation is up to the
/// handler.
pub type FrameHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Lifecycle state of the current socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent.
    Open,
    /// No socket.
    Closed,
}

/// The socket instance currently tracked by the manager.
struct LiveConnection {
    id: ConnectionId,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<Message>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the single agent-to-controller socket.
///
/// # Thread Safety
///
/// Shared as `Arc<ConnectionManager>`. [`try_send`](Self::try_send) takes a
/// short read lock and never awaits.
pub struct ConnectionManager {
    /// Control server URL.
    url: String,
    /// Fixed delay before reconnecting.
    reconnect_delay: Duration,
    /// Current socket, if any.
    slot: RwLock<Option<LiveConnection>>,
    /// Init-once guard for [`start`](Self::start).
    started: AtomicBool,
    /// Number of connection attempts made.
    attempts: AtomicU64,
    /// Connection task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Creates a manager; nothing connects until [`start`](Self::start).
    #[must_use]
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            reconnect_delay,
            slot: RwLock::new(None),
            started: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            task: Mutex::new(None),
        })
    }

    /// Starts the connect/reconnect task.
    ///
    /// Returns `false` without doing anything if already started.
    pub fn start(self: &Arc<Self>, handler: FrameHandler) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(url = %self.url, "Connection already started");
            return false;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run(handler).await;
        });
        *self.task.lock() = Some(handle);

        info!(url = %self.url, "Connection manager started");
        true
    }

    /// Stops reconnecting and drops the current socket.
    pub fn shutdown(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        *self.slot.write() = None;
        self.started.store(false, Ordering::Release);
        debug!(url = %self.url, "Connection manager shut down");
    }

    /// Returns the control server URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Returns the state of the current socket.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.slot
            .read()
            .as_ref()
            .map_or(ConnectionState::Closed, |c| c.state)
    }

    /// Returns the id of the current socket.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.slot.read().as_ref().map(|c| c.id)
    }

    /// Returns how many connection attempts have been made.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Returns `true` once [`start`](Self::start) has run.
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Connect, serve, wait, repeat. Never returns on its own.
    async fn run(self: Arc<Self>, handler: FrameHandler) {
        loop {
            self.serve_once(&handler).await;

            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            sleep(self.reconnect_delay).await;
        }
    }

    /// One connection attempt, returning when the socket is gone.
    async fn serve_once(&self, handler: &FrameHandler) {
        let id = ConnectionId::next();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        self.attempts.fetch_add(1, Ordering::AcqRel);
        *self.slot.write() = Some(LiveConnection {
            id,
            state: ConnectionState::Connecting,
            outbound,
        });

        let ws_stream = match connect_async(self.url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                warn!(%id, url = %self.url, error = %e, "Connection failed");
                self.release(id);
                return;
            }
        };

        self.mark_open(id);
        info!(%id, url = %self.url, "Connected");

        if !self.try_send(ping_frame()).is_delivered() {
            warn!(%id, "Ping frame could not be queued");
        }

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => handler(text.as_bytes()),

                        Some(Ok(Message::Binary(bytes))) => handler(&bytes),

                        Some(Ok(Message::Close(frame))) => {
                            debug!(%id, ?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(%id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(%id, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                outbound = outbound_rx.recv() => {
                    let Some(message) = outbound else {
                        debug!(%id, "Outbound channel closed");
                        break;
                    };

                    if let Err(e) = ws_write.send(message).await {
                        warn!(%id, error = %e, "Failed to send frame");
                        break;
                    }
                }
            }
        }

        self.release(id);
        info!(%id, url = %self.url, "Disconnected");
    }

    /// Marks the connection `id` as open if it is still current.
    fn mark_open(&self, id: ConnectionId) {
        if let Some(conn) = self.slot.write().as_mut()
            && conn.id == id
        {
            conn.state = ConnectionState::Open;
        }
    }

    /// Clears the slot if it still holds connection `id`.
    fn release(&self, id: ConnectionId) {
        let mut slot = self.slot.write();
        if slot.as_ref().is_some_and(|c| c.id == id) {
            *slot = None;
        }
    }
}

impl FrameSink for ConnectionManager {
    fn try_send(&self, bytes: Vec<u8>) -> SendOutcome {
        let slot = self.slot.read();

        let Some(conn) = slot.as_ref().filter(|c| c.state == ConnectionState::Open) else {
            trace!(len = bytes.len(), "No open connection, frame dropped");
            return SendOutcome::Dropped;
        };

        match conn.outbound.send(Message::Binary(bytes.into())) {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => {
                trace!(id = %conn.id, "Connection task gone, frame dropped");
                SendOutcome::Dropped
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_RECONNECT_DELAY.as_millis(), 1000);
    }

    #[test]
    fn test_try_send_without_connection_drops() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1", DEFAULT_RECONNECT_DELAY);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.try_send(b"chunk".to_vec()), SendOutcome::Dropped);
        assert!(manager.connection_id().is_none());
    }

    #[test]
    fn test_release_ignores_stale_id() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1", DEFAULT_RECONNECT_DELAY);
        let (outbound, _rx) = mpsc::unbounded_channel();
        let current = ConnectionId::next();
        *manager.slot.write() = Some(LiveConnection {
            id: current,
            state: ConnectionState::Connecting,
            outbound,
        });

        let stale = ConnectionId::next();
        manager.release(stale);
        manager.mark_open(stale);
        assert_eq!(manager.connection_id(), Some(current));
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.mark_open(current);
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(manager.try_send(b"x".to_vec()), SendOutcome::Delivered);

        manager.release(current);
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connecting_state_drops() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1", DEFAULT_RECONNECT_DELAY);
        let (outbound, mut rx) = mpsc::unbounded_channel();
        *manager.slot.write() = Some(LiveConnection {
            id: ConnectionId::next(),
            state: ConnectionState::Connecting,
            outbound,
        });

        assert_eq!(manager.try_send(b"x".to_vec()), SendOutcome::Dropped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1", Duration::from_secs(60));
        assert!(manager.start(Box::new(|_| {})));
        assert!(!manager.start(Box::new(|_| {})));
        assert!(manager.is_started());

        manager.shutdown();
        assert!(!manager.is_started());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
