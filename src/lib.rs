//! Chat Relay - Remote-controlled agent for a chat page.
//!
//! This library lets a controller drive a chat page it cannot reach
//! directly. An agent running next to the page keeps one WebSocket open to
//! the controller, executes the operations it receives, and relays the
//! page's streamed responses back verbatim.
//!
//! # Architecture
//!
//! The relay follows a client-server model:
//!
//! - **Controller**: Runs a [`ControlServer`], sends operations, reads relayed
//!   event-stream bytes
//! - **Agent**: Connects out, queues operations, executes them one at a time
//!   against the page, tees the page's event-stream responses
//!
//! Key design principles:
//!
//! - One socket per agent, reconnected after a fixed delay, never queued into
//! - Operations run strictly FIFO with at most one in flight
//! - Relayed chunks are byte-for-byte what the page received
//! - Decode faults abandon the queue; capability failures do not
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_relay::{Agent, ControlServer, Result, page::MemoryPage};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = ControlServer::bind_localhost(0).await?;
//!
//!     let agent = Agent::builder()
//!         .server_url(server.ws_url())
//!         .page(Arc::new(MemoryPage::new()))
//!         .build()?;
//!     agent.start();
//!
//!     let mut session = server.accept().await?;
//!     session.put_chat("Hello").await?;
//!     session.apply_chat().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Agent`] context, queue, dispatcher, execution loop |
//! | [`approve`] | Tool-use auto-approval |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`network`] | Fetch abstraction and event-stream tee |
//! | [`operations`] | Operation table and chat capabilities |
//! | [`page`] | Page abstraction and in-memory page |
//! | [`protocol`] | Operation records and SSE framing |
//! | [`transport`] | WebSocket client, server and frame sink |

// ============================================================================
// Modules
// ============================================================================

/// The agent: context, queue, dispatcher and execution loop.
///
/// Use [`Agent::builder()`] to create a configured agent.
pub mod agent;

/// Tool-use auto-approval.
pub mod approve;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Page network fetch and the event-stream tee.
pub mod network;

/// Operation table and built-in capabilities.
pub mod operations;

/// Page state abstraction.
pub mod page;

/// Wire protocol message types.
pub mod protocol;

/// WebSocket transport layer.
///
/// Agent-side connection management and the controller-side server.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Agent types
pub use agent::{Agent, AgentBuilder, AgentConfig, OperationQueue, TickOutcome};

// Approval types
pub use approve::{ApprovalDecision, AutoApprover};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Network types
pub use network::{Fetch, FetchRequest, FetchResponse, HttpFetch, TeeFetch};

// Operation types
pub use operations::{Capability, ChatOptions, OperationTable, Settlement, await_condition};

// Page types
pub use page::{MemoryPage, Page};

// Protocol types
pub use protocol::{OperationRecord, SseDecoder, SseEvent};

// Transport types
pub use transport::{
    ConnectionManager, ConnectionState, ControlServer, ControlSession, FrameSink, SendOutcome,
};
