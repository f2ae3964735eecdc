//! Tool-use auto-approval.
//!
//! Watches the page for confirmation dialogs of the form
//! `Run <tool> from <server>` and, for trusted tools, clicks the
//! `Allow for This Chat` button. After each approval the approver stays
//! quiet for a cooldown window so one dialog is never approved twice while
//! the page is still re-rendering.
//!
//! This is best effort: a missed dialog simply stays open for the user.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashSet;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::page::Page;

// ============================================================================
// Constants
// ============================================================================

/// Label fragment of the button that approves a tool for the chat.
pub const APPROVE_BUTTON_LABEL: &str = "Allow for This Chat";

/// Default quiet period after an approval.
pub const DEFAULT_APPROVAL_COOLDOWN: Duration = Duration::from_millis(1000);

static TOOL_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Run (\S+) from").expect("tool request pattern is valid"));

// ============================================================================
// ApprovalDecision
// ============================================================================

/// Result of one [`AutoApprover::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Within the cooldown window; the page was not inspected.
    CoolingDown,
    /// No confirmation dialog is open.
    NoDialog,
    /// The dialog does not name a tool.
    NoToolRequest,
    /// The tool is not trusted.
    Untrusted(String),
    /// The approve button could not be clicked.
    ButtonMissing(String),
    /// The tool was approved.
    Approved(String),
}

// ============================================================================
// AutoApprover
// ============================================================================

/// Clicks approve on dialogs requesting trusted tools.
#[derive(Debug)]
pub struct AutoApprover {
    trusted: FxHashSet<String>,
    cooldown: Duration,
    last_approval: Mutex<Option<Instant>>,
}

impl AutoApprover {
    /// Creates an approver for the given tool names.
    #[must_use]
    pub fn new<I, S>(trusted: I, cooldown: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted: trusted.into_iter().map(Into::into).collect(),
            cooldown,
            last_approval: Mutex::new(None),
        }
    }

    /// Returns `true` if `tool` is trusted.
    #[inline]
    #[must_use]
    pub fn is_trusted(&self, tool: &str) -> bool {
        self.trusted.contains(tool)
    }

    /// Trusted tool names, sorted.
    #[must_use]
    pub fn trusted_tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = self.trusted.iter().map(String::as_str).collect();
        tools.sort_unstable();
        tools
    }

    /// Returns the cooldown window.
    #[inline]
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Inspects the page once and approves if appropriate.
    pub fn check(&self, page: &dyn Page) -> ApprovalDecision {
        let mut last_approval = self.last_approval.lock();

        if last_approval.is_some_and(|at| at.elapsed() < self.cooldown) {
            return ApprovalDecision::CoolingDown;
        }

        let Some(dialog) = page.confirmation_dialog() else {
            return ApprovalDecision::NoDialog;
        };

        let Some(tool) = TOOL_REQUEST
            .captures(&dialog.prompt)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return ApprovalDecision::NoToolRequest;
        };

        if !self.is_trusted(&tool) {
            debug!(%tool, "Tool not trusted, leaving dialog open");
            return ApprovalDecision::Untrusted(tool);
        }

        if let Err(e) = page.click_dialog_button(APPROVE_BUTTON_LABEL) {
            warn!(%tool, error = %e, "Approve button not clickable");
            return ApprovalDecision::ButtonMissing(tool);
        }

        *last_approval = Some(Instant::now());
        info!(%tool, "Tool auto-approved");
        ApprovalDecision::Approved(tool)
    }

    /// Checks the page after every mutation until the page goes away.
    pub async fn observe(self: Arc<Self>, page: Arc<dyn Page>) {
        let mut mutations = page.subscribe_mutations();

        debug!(tools = self.trusted.len(), "Auto-approver observing");

        loop {
            match mutations.recv().await {
                Ok(()) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Mutation notifications lagged");
                }
                Err(RecvError::Closed) => break,
            }
            self.check(page.as_ref());
        }

        debug!("Auto-approver stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
