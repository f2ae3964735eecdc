//! Page state surface.
//!
//! The agent never touches a DOM directly. Capabilities and the auto-approver
//! read and mutate page state through the [`Page`] trait, which a host
//! implements over its real page. [`MemoryPage`] is a self-contained model
//! of the chat page used by tests, benches and the demo.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Page`] | Page state operations used by capabilities |
//! | [`Link`] | Navigable anchor |
//! | [`LinkQuery`] | How a link is located |
//! | [`ConfirmationDialog`] | Tool-use confirmation prompt |
//! | [`MemoryPage`] | In-memory chat page |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory chat page model.
pub mod memory;

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::broadcast;
use url::Url;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryPage;

// ============================================================================
// Constants
// ============================================================================

/// Chat input paragraph.
pub const CHAT_INPUT: &str = ".ProseMirror p";

/// Link that opens a fresh conversation.
pub const NEW_CHAT_HREF: &str = "/new";

/// Link to the project list.
pub const PROJECTS_HREF: &str = "/projects";

/// Prefix of individual project links.
pub const PROJECT_HREF_PREFIX: &str = "/project/";

/// Base used to resolve relative hrefs.
const PAGE_BASE: &str = "https://page.invalid/";

// ============================================================================
// Types
// ============================================================================

/// A navigable anchor on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Link target, absolute or relative to the page origin.
    pub href: String,
    /// Visible text of the link's first child.
    pub text: String,
}

impl Link {
    /// Creates a link.
    #[inline]
    #[must_use]
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }

    /// Returns the path component the page will show after following this
    /// link.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Url`] if the href cannot be resolved.
    pub fn target_path(&self) -> Result<String> {
        let url = Url::parse(PAGE_BASE)?.join(&self.href)?;
        Ok(url.path().to_string())
    }
}

/// How a link is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkQuery {
    /// Exact `href` attribute match.
    Href(String),
    /// Project link whose trimmed text equals the name.
    ProjectName(String),
}

impl LinkQuery {
    /// Matches a link by exact href.
    #[inline]
    #[must_use]
    pub fn href(href: impl Into<String>) -> Self {
        Self::Href(href.into())
    }

    /// Returns `true` if `link` satisfies the query.
    #[must_use]
    pub fn matches(&self, link: &Link) -> bool {
        match self {
            Self::Href(href) => link.href == *href,
            Self::ProjectName(name) => {
                link.href.starts_with(PROJECT_HREF_PREFIX) && link.text.trim() == name
            }
        }
    }
}

/// A tool-use confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationDialog {
    /// Text of the request, e.g. `Run read_file from filesystem`.
    pub prompt: String,
    /// Button labels in document order.
    pub buttons: Vec<String>,
}

// ============================================================================
// Page
// ============================================================================

/// Page state operations.
///
/// Implementations must be cheap and non-blocking; all waiting happens in
/// the caller through polling.
pub trait Page: Send + Sync {
    /// Text of the chat input, or `None` if the input element is missing.
    fn input_text(&self) -> Option<String>;

    /// Replaces the chat input text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ElementNotFound`] if the input is missing.
    fn set_input_text(&self, text: &str) -> Result<()>;

    /// Sends an Enter key press to the chat input.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ElementNotFound`] if the input is missing.
    fn press_enter(&self) -> Result<()>;

    /// Current location path.
    fn location_path(&self) -> String;

    /// Finds the first link matching the query.
    fn find_link(&self, query: &LinkQuery) -> Option<Link>;

    /// Clicks a link.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ElementNotFound`] if the link is gone.
    fn click_link(&self, link: &Link) -> Result<()>;

    /// The currently open confirmation dialog, if any.
    fn confirmation_dialog(&self) -> Option<ConfirmationDialog>;

    /// Clicks the first dialog button whose label contains `label`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ElementNotFound`] if there is no dialog or no
    /// such button.
    fn click_dialog_button(&self, label: &str) -> Result<()>;

    /// Subscribes to page mutation notifications.
    fn subscribe_mutations(&self) -> broadcast::Receiver<()>;
}

// ============================================================================
// Tests
// ============================================================================
