//! WebSocket transport layer.
//!
//! This module handles communication between the agent (inside the page)
//! and the controller via one WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐                          ┌─────────────────────┐
//! │  Agent              │                          │  Controller         │
//! │                     │        WebSocket         │                     │
//! │  ConnectionManager  │─────────────────────────►│  ControlServer      │
//! │  (client, retries)  │◄─────────────────────────│  → ControlSession   │
//! │                     │     ws://HOST:PORT       │                     │
//! └─────────────────────┘                          └─────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ControlServer::bind` - Controller listens
//! 2. `ConnectionManager::start` - Agent connects, sends ping
//! 3. `ControlServer::accept` - Controller receives ping
//! 4. Operations flow in as text frames, relayed bytes flow out as binary
//! 5. On drop the agent reconnects after a fixed delay
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Agent-side socket with reconnection |
//! | `server` | Controller-side server and session |
//! | `sink` | Fire-and-forget outbound frame contract |

// ============================================================================
// Submodules
// ============================================================================

/// Agent-side socket with reconnection.
pub mod connection;

/// Controller-side WebSocket server.
pub mod server;

/// Outbound frame sink.
pub mod sink;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionManager, ConnectionState, FrameHandler};
pub use server::{ControlServer, ControlSession};
pub use sink::{FrameSink, MemorySink, SendOutcome};
