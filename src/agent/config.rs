//! Agent configuration.
//!
//! Plain data with defaults; validation happens in
//! [`AgentBuilder::build`](super::AgentBuilder::build).
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use chat_relay::AgentConfig;
//!
//! let config = AgentConfig::new()
//!     .with_server_url("ws://127.0.0.1:9300")
//!     .with_reconnect_delay(Duration::from_millis(250))
//!     .with_trusted_tool("read_file");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::approve::DEFAULT_APPROVAL_COOLDOWN;
use crate::operations::ChatOptions;
use crate::transport::connection::DEFAULT_RECONNECT_DELAY;

use super::executor::DEFAULT_TICK_INTERVAL;

// ============================================================================
// Constants
// ============================================================================

/// Default control server URL.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:9223";

// ============================================================================
// AgentConfig
// ============================================================================

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// WebSocket URL of the control server.
    pub server_url: String,

    /// Fixed wait between losing the connection and reconnecting.
    pub reconnect_delay: Duration,

    /// Execution loop tick interval.
    pub tick_interval: Duration,

    /// Timing of the built-in chat capabilities.
    pub chat: ChatOptions,

    /// Tools the auto-approver may approve. Empty disables it.
    pub trusted_tools: Vec<String>,

    /// Quiet period after each auto-approval.
    pub approval_cooldown: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            chat: ChatOptions::default(),
            trusted_tools: Vec::new(),
            approval_cooldown: DEFAULT_APPROVAL_COOLDOWN,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl AgentConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the control server URL.
    #[inline]
    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the execution tick interval.
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the chat capability timings.
    #[inline]
    #[must_use]
    pub fn with_chat_options(mut self, chat: ChatOptions) -> Self {
        self.chat = chat;
        self
    }

    /// Adds a trusted tool.
    #[inline]
    #[must_use]
    pub fn with_trusted_tool(mut self, tool: impl Into<String>) -> Self {
        self.trusted_tools.push(tool.into());
        self
    }

    /// Sets the auto-approval cooldown.
    #[inline]
    #[must_use]
    pub fn with_approval_cooldown(mut self, cooldown: Duration) -> Self {
        self.approval_cooldown = cooldown;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
