//! The agent living inside the chat page.
//!
//! # Data Flow
//!
//! ```text
//! controller ──text──► ConnectionManager ──► InboundDispatcher ──► OperationQueue
//!                                                                      │
//!                       page ◄── OperationTable ◄── ExecutionLoop ◄────┘
//!
//! page fetch ──► TeeFetch ──► ConnectionManager ──binary──► controller
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`AgentBuilder`] with validation |
//! | `config` | [`AgentConfig`] and defaults |
//! | `core` | [`Agent`] context: start, shutdown, fetch installation |
//! | `dispatcher` | Inbound frame decoding |
//! | `executor` | Single-flight FIFO execution loop |
//! | `fault` | Queue clearing and error frame reporting |
//! | `queue` | Shared FIFO operation queue |

// ============================================================================
// Submodules
// ============================================================================

/// Agent builder.
pub mod builder;

/// Agent configuration.
pub mod config;

/// Agent context.
pub mod core;

/// Inbound frame dispatch.
pub mod dispatcher;

/// Execution loop.
pub mod executor;

/// Fault reporting.
pub mod fault;

/// Operation queue.
pub mod queue;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::AgentBuilder;
pub use config::{AgentConfig, DEFAULT_SERVER_URL};
pub use core::Agent;
pub use dispatcher::InboundDispatcher;
pub use executor::{DEFAULT_TICK_INTERVAL, ExecutionLoop, TickOutcome};
pub use fault::FaultReporter;
pub use queue::{OperationQueue, QueueHead};
