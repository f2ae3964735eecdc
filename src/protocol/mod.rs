//! Wire protocol message types.
//!
//! This module defines the frames exchanged between the controller and the
//! agent over the single WebSocket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `OperationRecord` | Controller → Agent | Named command with arguments (JSON text frame) |
//! | ping `SseEvent` | Agent → Controller | Liveness, once per connect |
//! | error `SseEvent` | Agent → Controller | Fatal dispatch fault report |
//! | relayed bytes | Agent → Controller | Verbatim page event-stream chunks |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `operation` | Operation record codec |
//! | `sse` | Event-stream encoder and incremental decoder |

// ============================================================================
// Submodules
// ============================================================================

/// Operation record codec.
pub mod operation;

/// Server-sent event framing.
pub mod sse;

// ============================================================================
// Re-exports
// ============================================================================

pub use operation::OperationRecord;
pub use sse::{
    DECODE_ERROR_KIND, EXECUTION_PANIC_KIND, SseDecoder, SseEvent, error_frame, ping_frame,
};
