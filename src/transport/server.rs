//! Controller side of the relay socket.
//!
//! The controller runs a WebSocket server the agent connects to.
//!
//! # Connection Flow
//!
//! 1. Controller binds [`ControlServer`] (port 0 for a random port)
//! 2. Agent is configured with [`ControlServer::ws_url`] and started
//! 3. [`ControlServer::accept`] upgrades the agent's connection
//! 4. The agent's ping frame completes the handshake
//! 5. [`ControlSession`] pushes operations and reads relayed frames
//!
//! The agent reconnects on its own after a drop, so `accept` can be called
//! again on the same server.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures_util::{FutureExt, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::operations::chat::{APPLY_CHAT, CLEAR_CHAT, NEW_CHAT, PUT_CHAT};
use crate::protocol::{OperationRecord, SseDecoder, SseEvent};

// ============================================================================
// Constants
// ============================================================================

/// Default controller port.
pub const DEFAULT_PORT: u16 = 9223;

/// Timeout for the agent to connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the ping frame after the upgrade.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ControlServer
// ============================================================================

/// A bound WebSocket server waiting for the agent.
///
/// # Example
///
/// ```ignore
/// use chat_relay::transport::ControlServer;
///
/// let server = ControlServer::bind_localhost(0).await?;
/// // start the agent with server.ws_url() ...
/// let mut session = server.accept().await?;
/// let events = session.communicate("Hello").await?;
/// ```
pub struct ControlServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the server is bound to.
    addr: SocketAddr,
}

impl ControlServer {
    /// Binds to the given address and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(%addr, "Control server bound");

        Ok(Self { listener, addr })
    }

    /// Binds to `127.0.0.1:{port}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_localhost(port: u16) -> Result<Self> {
        Self::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), port).await
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the URL the agent should connect to.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accepts the agent with the default 30s timeout.
    ///
    /// # Errors
    ///
    /// See [`accept_timeout`](Self::accept_timeout).
    pub async fn accept(&self) -> Result<ControlSession> {
        self.accept_timeout(CONNECTION_TIMEOUT).await
    }

    /// Accepts the agent and waits for its ping frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if nothing connects in time, or the
    ///   ping frame does not arrive within 5s
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    /// - [`Error::Protocol`] if the first frame is not a ping
    pub async fn accept_timeout(&self, accept_timeout: Duration) -> Result<ControlSession> {
        let (stream, peer) = timeout(accept_timeout, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(accept_timeout.as_millis() as u64))??;

        debug!(%peer, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let mut session = ControlSession::new(ws_stream, peer);

        let first = timeout(PING_TIMEOUT, session.next_frame_inner(true))
            .await
            .map_err(|_| Error::connection_timeout(PING_TIMEOUT.as_millis() as u64))??;

        let is_ping = SseDecoder::new().push(&first).first().is_some_and(SseEvent::is_ping);
        if !is_ping {
            return Err(Error::protocol("Expected ping as first frame"));
        }

        info!(%peer, port = self.port(), "Agent connected");
        Ok(session)
    }
}

// ============================================================================
// ControlSession
// ============================================================================

/// One accepted agent connection.
pub struct ControlSession {
    ws_stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
}

impl ControlSession {
    fn new(ws_stream: WebSocketStream<TcpStream>, peer: SocketAddr) -> Self {
        Self { ws_stream, peer }
    }

    /// Returns the agent's address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the frame cannot be written.
    pub async fn send_operation(&mut self, record: &OperationRecord) -> Result<()> {
        let json = record.encode()?;
        trace!(peer = %self.peer, %json, "Sending operation");
        self.ws_stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Sends an arbitrary text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the frame cannot be written.
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws_stream
            .send(Message::Text(text.to_string().into()))
            .await?;
        Ok(())
    }

    /// Sends an arbitrary binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the frame cannot be written.
    pub async fn send_raw_binary(&mut self, payload: &[u8]) -> Result<()> {
        self.ws_stream
            .send(Message::Binary(payload.to_vec().into()))
            .await?;
        Ok(())
    }

    /// Queues `apply_chat`.
    ///
    /// # Errors
    ///
    /// See [`send_operation`](Self::send_operation).
    pub async fn apply_chat(&mut self) -> Result<()> {
        self.send_operation(&OperationRecord::bare(APPLY_CHAT)).await
    }

    /// Queues `put_chat(text)`.
    ///
    /// # Errors
    ///
    /// See [`send_operation`](Self::send_operation).
    pub async fn put_chat(&mut self, text: &str) -> Result<()> {
        self.send_operation(&OperationRecord::new(PUT_CHAT, vec![json!(text)]))
            .await
    }

    /// Queues `clear_chat`.
    ///
    /// # Errors
    ///
    /// See [`send_operation`](Self::send_operation).
    pub async fn clear_chat(&mut self) -> Result<()> {
        self.send_operation(&OperationRecord::bare(CLEAR_CHAT)).await
    }

    /// Queues `new_chat(project)`.
    ///
    /// # Errors
    ///
    /// See [`send_operation`](Self::send_operation).
    pub async fn new_chat(&mut self, project: Option<&str>) -> Result<()> {
        let args = project.map(|p| vec![Value::from(p)]).unwrap_or_default();
        self.send_operation(&OperationRecord::new(NEW_CHAT, args))
            .await
    }

    /// Reads the next frame, skipping pings.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the agent disconnects
    /// - [`Error::WebSocket`] on a transport error
    pub async fn next_frame(&mut self) -> Result<Vec<u8>> {
        self.next_frame_inner(false).await
    }

    /// Reads the next frame, including pings.
    ///
    /// # Errors
    ///
    /// See [`next_frame`](Self::next_frame).
    pub async fn next_frame_with_pings(&mut self) -> Result<Vec<u8>> {
        self.next_frame_inner(true).await
    }

    /// Reads the next non-ping frame, or `None` if none arrives in time.
    ///
    /// # Errors
    ///
    /// See [`next_frame`](Self::next_frame).
    pub async fn next_frame_timeout(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        match timeout(wait, self.next_frame_inner(false)).await {
            Ok(frame) => frame.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Drops every frame that has already arrived, without waiting.
    ///
    /// Returns the number of frames dropped.
    ///
    /// # Errors
    ///
    /// See [`next_frame`](Self::next_frame).
    pub fn discard_pending(&mut self) -> Result<usize> {
        let mut dropped = 0;
        while let Some(message) = self.ws_stream.next().now_or_never() {
            match message {
                Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(_)) => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(peer = %self.peer, dropped, "Discarded stale frames");
        }
        Ok(dropped)
    }

    /// Submits `message` and collects the relayed response events.
    ///
    /// Frames relayed before the call are discarded first. Then sends
    /// `put_chat` and `apply_chat` and decodes relayed frames until a
    /// `message_stop` event, which is included in the result.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the stream carries an `error` event
    /// - [`Error::ConnectionClosed`] if the agent disconnects first
    pub async fn communicate(&mut self, message: &str) -> Result<Vec<SseEvent>> {
        self.discard_pending()?;
        self.put_chat(message).await?;
        self.apply_chat().await?;

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();

        loop {
            let frame = self.next_frame().await?;
            for event in decoder.push(&frame) {
                if event.is_ping() {
                    continue;
                }
                if event.is_error() {
                    return Err(event.to_remote_error());
                }

                let done = event.is_message_stop();
                events.push(event);
                if done {
                    debug!(count = events.len(), "Response complete");
                    return Ok(events);
                }
            }
        }
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the close frame cannot be written.
    pub async fn close(mut self) -> Result<()> {
        self.ws_stream.close(None).await?;
        Ok(())
    }

    async fn next_frame_inner(&mut self, include_pings: bool) -> Result<Vec<u8>> {
        loop {
            let bytes = match self.ws_stream.next().await {
                Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
                Some(Err(e)) => return Err(e.into()),
                // Ignore Ping, Pong, Frame
                Some(Ok(_)) => continue,
            };

            if !include_pings && is_ping_frame(&bytes) {
                trace!(peer = %self.peer, "Skipping ping frame");
                continue;
            }

            return Ok(bytes);
        }
    }
}

/// Returns `true` if the frame starts with a ping event line.
fn is_ping_frame(bytes: &[u8]) -> bool {
    bytes.starts_with(b"event: ping\n")
}

// ============================================================================
// Tests
// ============================================================================
