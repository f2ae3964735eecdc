//! Built-in chat page capabilities.
//!
//! | Operation | Arguments | Settles when |
//! |-----------|-----------|--------------|
//! | `apply_chat` | none | the input is empty again after Enter |
//! | `put_chat` | `text: string` | immediately after the input is replaced |
//! | `clear_chat` | none | immediately after the input is emptied |
//! | `new_chat` | `project?: string` | the page path equals the followed link |
//!
//! Every capability fails with [`Error::ElementNotFound`] when a required
//! element is missing.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::page::{
    CHAT_INPUT, LinkQuery, NEW_CHAT_HREF, PROJECT_HREF_PREFIX, PROJECTS_HREF, Page,
};

use super::poll::{DEFAULT_POLL_INTERVAL, Settlement, await_condition};
use super::{Capability, OperationTable};

// ============================================================================
// Constants
// ============================================================================

/// Submit the current input.
pub const APPLY_CHAT: &str = "apply_chat";

/// Replace the input text.
pub const PUT_CHAT: &str = "put_chat";

/// Empty the input.
pub const CLEAR_CHAT: &str = "clear_chat";

/// Open a fresh conversation, optionally inside a project.
pub const NEW_CHAT: &str = "new_chat";

/// Default time allowed for a link navigation to land.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Project ids look like UUIDs but are not restricted to hex digits.
static PROJECT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{8}(-[A-Za-z0-9]{4}){3}-[A-Za-z0-9]{12}$")
        .expect("project id pattern is valid")
});

// ============================================================================
// ChatOptions
// ============================================================================

/// Timing knobs shared by the chat capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatOptions {
    /// Interval between page-state checks.
    pub poll_interval: Duration,
    /// Limit for `apply_chat` to see the input clear. `None` waits forever.
    pub submit_timeout: Option<Duration>,
    /// Limit for each link navigation in `new_chat`.
    pub navigation_timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            submit_timeout: None,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }
}

/// Builds a table with the four chat capabilities bound to `page`.
#[must_use]
pub fn chat_table(page: Arc<dyn Page>, options: ChatOptions) -> OperationTable {
    let mut table = OperationTable::new();
    table
        .register(APPLY_CHAT, ApplyChat::new(Arc::clone(&page), options))
        .register(PUT_CHAT, PutChat::new(Arc::clone(&page)))
        .register(CLEAR_CHAT, ClearChat::new(Arc::clone(&page)))
        .register(NEW_CHAT, NewChat::new(page, options));
    table
}

// ============================================================================
// apply_chat
// ============================================================================

/// Presses Enter in the input and waits for it to empty.
pub struct ApplyChat {
    page: Arc<dyn Page>,
    options: ChatOptions,
}

impl ApplyChat {
    /// Creates the capability.
    #[must_use]
    pub fn new(page: Arc<dyn Page>, options: ChatOptions) -> Self {
        Self { page, options }
    }
}

#[async_trait]
impl Capability for ApplyChat {
    async fn invoke(&self, _args: &[Value]) -> Result<()> {
        if self.page.input_text().is_none() {
            return Err(Error::element_not_found(CHAT_INPUT));
        }

        self.page.press_enter()?;

        let page = &self.page;
        let outcome = await_condition(
            || page.input_text().is_some_and(|text| text.is_empty()),
            self.options.poll_interval,
            self.options.submit_timeout,
        )
        .await;

        match outcome {
            Settlement::Settled => Ok(()),
            Settlement::TimedOut => Err(Error::timeout(
                "chat input to clear after submit",
                self.options.submit_timeout.unwrap_or_default().as_millis() as u64,
            )),
        }
    }
}

// ============================================================================
// put_chat
// ============================================================================

/// Replaces the input text with the first argument.
pub struct PutChat {
    page: Arc<dyn Page>,
}

impl PutChat {
    /// Creates the capability.
    #[must_use]
    pub fn new(page: Arc<dyn Page>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl Capability for PutChat {
    async fn invoke(&self, args: &[Value]) -> Result<()> {
        let text = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_argument("put_chat expects a text string"))?;

        self.page.set_input_text(text)
    }
}

// ============================================================================
// clear_chat
// ============================================================================

/// Empties the input.
pub struct ClearChat {
    page: Arc<dyn Page>,
}

impl ClearChat {
    /// Creates the capability.
    #[must_use]
    pub fn new(page: Arc<dyn Page>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl Capability for ClearChat {
    async fn invoke(&self, _args: &[Value]) -> Result<()> {
        self.page.set_input_text("")
    }
}

// ============================================================================
// new_chat
// ============================================================================

/// Opens a fresh conversation, optionally inside a project.
pub struct NewChat {
    page: Arc<dyn Page>,
    options: ChatOptions,
}

impl NewChat {
    /// Creates the capability.
    #[must_use]
    pub fn new(page: Arc<dyn Page>, options: ChatOptions) -> Self {
        Self { page, options }
    }

    /// Clicks the link matching `query` and waits for the path to follow.
    async fn follow(&self, query: LinkQuery, element: &str) -> Result<String> {
        let link = self
            .page
            .find_link(&query)
            .ok_or_else(|| Error::element_not_found(element))?;
        let target = link.target_path()?;

        debug!(href = %link.href, %target, "Following link");
        self.page.click_link(&link)?;

        let page = &self.page;
        let outcome = await_condition(
            || page.location_path() == target,
            self.options.poll_interval,
            Some(self.options.navigation_timeout),
        )
        .await;

        match outcome {
            Settlement::Settled => Ok(target),
            Settlement::TimedOut => Err(Error::timeout(
                format!("navigate to {target} (at {})", self.page.location_path()),
                self.options.navigation_timeout.as_millis() as u64,
            )),
        }
    }
}

#[async_trait]
impl Capability for NewChat {
    async fn invoke(&self, args: &[Value]) -> Result<()> {
        let project = match args.first() {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "new_chat expects a project id or name, got {other}"
                )));
            }
        };

        let Some(project) = project else {
            self.follow(LinkQuery::href(NEW_CHAT_HREF), "new chat link")
                .await?;
            return Ok(());
        };

        self.follow(LinkQuery::href(PROJECTS_HREF), "projects link")
            .await?;

        let query = if PROJECT_ID.is_match(project) {
            LinkQuery::href(format!("{PROJECT_HREF_PREFIX}{project}"))
        } else {
            LinkQuery::ProjectName(project.to_string())
        };

        if self.page.find_link(&query).is_none() {
            return Err(Error::project_not_found(project));
        }

        self.follow(query, project).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
