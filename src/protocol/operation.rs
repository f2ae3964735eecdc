//! Operation records.
//!
//! An operation is the unit the controller dispatches over the socket: a
//! name plus an ordered argument list.
//!
//! # Format
//!
//! ```json
//! { "op": "put_chat", "args": ["hello"] }
//! ```
//!
//! `args` may be omitted or `null`, both meaning "no arguments".

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// OperationRecord
// ============================================================================

/// A named remote command with ordered arguments.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    op: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
}

/// Wire shape accepted on decode.
#[derive(Deserialize)]
struct WireOperation {
    op: String,
    #[serde(default)]
    args: Option<Vec<Value>>,
}

impl OperationRecord {
    /// Creates a new record.
    #[inline]
    #[must_use]
    pub fn new(op: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }

    /// Creates a record without arguments.
    #[inline]
    #[must_use]
    pub fn bare(op: impl Into<String>) -> Self {
        Self::new(op, Vec::new())
    }

    /// Decodes a record from one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the text is not a JSON object with a
    /// string `op` and an optional array `args`.
    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireOperation =
            serde_json::from_str(text).map_err(|e| Error::decode(e.to_string()))?;

        Ok(Self {
            op: wire.op,
            args: wire.args.unwrap_or_default(),
        })
    }

    /// Encodes the record as one outbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the operation name.
    #[inline]
    #[must_use]
    pub fn op(&self) -> &str {
        &self.op
    }

    /// Returns the arguments in order.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

// ============================================================================
// Tests
// ============================================================================
