//! Operation table.
//!
//! Maps operation names to capabilities. The execution loop only relies on
//! the contract that a capability eventually settles with `Ok(())` or an
//! error; what it does to the page is its own business.
//!
//! # Example
//!
//! ```ignore
//! use chat_relay::operations::OperationTable;
//!
//! let mut table = OperationTable::new();
//! table.register_fn("noop", |_args| async { Ok(()) });
//! assert!(table.contains("noop"));
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `chat` | Built-in chat page capabilities |
//! | `poll` | `await_condition` poll primitive |

// ============================================================================
// Submodules
// ============================================================================

/// Built-in chat page capabilities.
pub mod chat;

/// Poll-with-timeout primitive.
pub mod poll;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use chat::{ChatOptions, chat_table};
pub use poll::{Settlement, await_condition};

// ============================================================================
// Capability
// ============================================================================

/// An asynchronous action bound to an operation name.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Runs the action with the record's arguments.
    async fn invoke(&self, args: &[Value]) -> Result<()>;
}

/// Capability backed by a closure.
pub struct FnCapability<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn invoke(&self, args: &[Value]) -> Result<()> {
        (self.f)(args.to_vec()).await
    }
}

// ============================================================================
// OperationTable
// ============================================================================

/// Fixed mapping from operation name to capability.
///
/// Cheap to clone; capabilities are shared.
#[derive(Clone, Default)]
pub struct OperationTable {
    entries: FxHashMap<String, Arc<dyn Capability>>,
}

impl fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTable")
            .field("operations", &self.names())
            .finish()
    }
}

impl OperationTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability, replacing any previous one with that name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        capability: impl Capability + 'static,
    ) -> &mut Self {
        self.entries.insert(name.into(), Arc::new(capability));
        self
    }

    /// Registers a closure as a capability.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(name, FnCapability { f })
    }

    /// Moves every entry of `other` into this table.
    ///
    /// Entries in `other` win on name clashes.
    pub fn extend(&mut self, other: OperationTable) -> &mut Self {
        self.entries.extend(other.entries);
        self
    }

    /// Looks up a capability by name.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).cloned()
    }

    /// Returns `true` if a capability is registered under `name`.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered capabilities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
