//! Builder pattern for agent configuration.
//!
//! Provides a fluent API for configuring and creating [`Agent`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{Agent, page::MemoryPage};
//!
//! let agent = Agent::builder()
//!     .server_url("ws://127.0.0.1:9223")
//!     .page(Arc::new(MemoryPage::new()))
//!     .trusted_tool("read_file")
//!     .build()?;
//! agent.start();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::operations::{Capability, ChatOptions, OperationTable, chat_table};
use crate::page::Page;

use super::config::AgentConfig;
use super::core::Agent;

// ============================================================================
// AgentBuilder
// ============================================================================

/// Builder for configuring an [`Agent`] instance.
///
/// Use [`Agent::builder()`] to create a new builder.
#[derive(Clone, Default)]
pub struct AgentBuilder {
    /// Settings.
    config: AgentConfig,
    /// Page the chat capabilities and auto-approver act on.
    page: Option<Arc<dyn Page>>,
    /// Extra capabilities, taking precedence over built-ins.
    operations: OperationTable,
}

impl fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("config", &self.config)
            .field("has_page", &self.page.is_some())
            .field("operations", &self.operations)
            .finish()
    }
}

// ============================================================================
// AgentBuilder Implementation
// ============================================================================

impl AgentBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the control server URL.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL (e.g., "ws://127.0.0.1:9223")
    #[inline]
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Sets the fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Sets the execution tick interval.
    #[inline]
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Sets the chat capability timings.
    #[inline]
    #[must_use]
    pub fn chat_options(mut self, options: ChatOptions) -> Self {
        self.config.chat = options;
        self
    }

    /// Adds a tool the auto-approver may approve.
    #[inline]
    #[must_use]
    pub fn trusted_tool(mut self, tool: impl Into<String>) -> Self {
        self.config.trusted_tools.push(tool.into());
        self
    }

    /// Sets the auto-approval cooldown.
    #[inline]
    #[must_use]
    pub fn approval_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.approval_cooldown = cooldown;
        self
    }

    /// Sets the page, enabling the built-in chat capabilities.
    #[inline]
    #[must_use]
    pub fn page(mut self, page: Arc<dyn Page>) -> Self {
        self.page = Some(page);
        self
    }

    /// Registers an extra capability.
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>, capability: impl Capability + 'static) -> Self {
        self.operations.register(name, capability);
        self
    }

    /// Adds every capability of `table`.
    #[must_use]
    pub fn operations(mut self, table: OperationTable) -> Self {
        self.operations.extend(table);
        self
    }

    /// Builds the agent with validation.
    ///
    /// Nothing connects until [`Agent::start`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the server URL is not a `ws://` or `wss://` URL
    /// - [`Error::Config`] if the tick interval is zero
    pub fn build(self) -> Result<Agent> {
        self.validate_server_url()?;
        self.validate_tick_interval()?;

        let mut table = match &self.page {
            Some(page) => chat_table(Arc::clone(page), self.config.chat),
            None => OperationTable::new(),
        };
        table.extend(self.operations);

        Ok(Agent::new(self.config, self.page, table))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl AgentBuilder {
    /// Validates the control server URL.
    fn validate_server_url(&self) -> Result<()> {
        let url = Url::parse(&self.config.server_url).map_err(|e| {
            Error::config(format!(
                "Invalid server URL '{}': {e}\n\
                 Example: Agent::builder().server_url(\"ws://127.0.0.1:9223\")",
                self.config.server_url
            ))
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Server URL must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }

        Ok(())
    }

    /// Validates the tick interval.
    fn validate_tick_interval(&self) -> Result<()> {
        if self.config.tick_interval.is_zero() {
            return Err(Error::config("Tick interval must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::operations::chat::{APPLY_CHAT, CLEAR_CHAT, NEW_CHAT, PUT_CHAT};
    use crate::page::MemoryPage;

    #[test]
    fn test_new_uses_default_config() {
        let builder = AgentBuilder::new();
        assert_eq!(builder.config, AgentConfig::default());
        assert!(builder.page.is_none());
        assert!(builder.operations.is_empty());
    }

    #[test]
    fn test_setters_update_config() {
        let builder = AgentBuilder::new()
            .server_url("wss://relay.invalid/ws")
            .reconnect_delay(Duration::from_millis(5))
            .tick_interval(Duration::from_millis(2))
            .trusted_tool("read_file")
            .approval_cooldown(Duration::from_millis(7));

        assert_eq!(builder.config.server_url, "wss://relay.invalid/ws");
        assert_eq!(builder.config.reconnect_delay, Duration::from_millis(5));
        assert_eq!(builder.config.tick_interval, Duration::from_millis(2));
        assert_eq!(builder.config.trusted_tools, vec!["read_file"]);
        assert_eq!(builder.config.approval_cooldown, Duration::from_millis(7));
    }

    #[test]
    fn test_build_rejects_unparseable_url() {
        let err = AgentBuilder::new().server_url("not a url").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Invalid server URL"));
    }

    #[test]
    fn test_build_rejects_http_scheme() {
        let err = AgentBuilder::new()
            .server_url("http://127.0.0.1:9223")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn test_build_rejects_zero_tick() {
        let err = AgentBuilder::new()
            .tick_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Tick interval"));
    }

    #[test]
    fn test_build_with_page_registers_chat_operations() {
        let agent = AgentBuilder::new()
            .page(Arc::new(MemoryPage::new()))
            .operations({
                let mut table = OperationTable::new();
                table.register_fn("noop", |_| async { Ok(()) });
                table
            })
            .build()
            .expect("build");

        assert_eq!(
            agent.operations().names(),
            vec![APPLY_CHAT, CLEAR_CHAT, NEW_CHAT, "noop", PUT_CHAT]
        );
    }

    #[test]
    fn test_build_without_page_has_only_custom_operations() {
        let agent = AgentBuilder::new()
            .operations({
                let mut table = OperationTable::new();
                table.register_fn("noop", |_| async { Ok(()) });
                table
            })
            .build()
            .expect("build");

        assert_eq!(agent.operations().names(), vec!["noop"]);
    }
}
