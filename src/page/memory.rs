//! In-memory chat page model.
//!
//! Mirrors the parts of the chat page the capabilities depend on: one input
//! paragraph, a location path, navigation links, a project list that is only
//! rendered on `/projects`, and an optional confirmation dialog. Submitting
//! and navigating can be given latencies so callers exercise real polling.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{Error, Result};

use super::{
    CHAT_INPUT, ConfirmationDialog, Link, LinkQuery, NEW_CHAT_HREF, PROJECT_HREF_PREFIX,
    PROJECTS_HREF, Page,
};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the mutation notification channel.
const MUTATION_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug)]
struct PageState {
    input: Option<String>,
    path: String,
    links: Vec<Link>,
    projects: Vec<Link>,
    dialog: Option<ConfirmationDialog>,
    submitted: Vec<String>,
    clicked_buttons: Vec<String>,
    submit_delay: Option<Duration>,
    navigation_delay: Option<Duration>,
    submit_stalled: bool,
}

struct MemoryPageInner {
    state: Mutex<PageState>,
    mutations: broadcast::Sender<()>,
}

// ============================================================================
// MemoryPage
// ============================================================================

/// In-memory chat page.
///
/// Cheap to clone; clones share the same page.
#[derive(Clone)]
pub struct MemoryPage {
    inner: Arc<MemoryPageInner>,
}

impl fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryPage")
            .field("path", &state.path)
            .field("input", &state.input)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    /// Creates a page at `/` with an empty input and the `/new` and
    /// `/projects` links.
    #[must_use]
    pub fn new() -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let state = PageState {
            input: Some(String::new()),
            path: "/".to_string(),
            links: vec![
                Link::new(NEW_CHAT_HREF, "New chat"),
                Link::new(PROJECTS_HREF, "Projects"),
            ],
            projects: Vec::new(),
            dialog: None,
            submitted: Vec::new(),
            clicked_buttons: Vec::new(),
            submit_delay: None,
            navigation_delay: None,
            submit_stalled: false,
        };

        Self {
            inner: Arc::new(MemoryPageInner {
                state: Mutex::new(state),
                mutations,
            }),
        }
    }

    /// Adds a project rendered on the `/projects` page.
    #[must_use]
    pub fn with_project(self, id: &str, name: &str) -> Self {
        self.inner
            .state
            .lock()
            .projects
            .push(Link::new(format!("{PROJECT_HREF_PREFIX}{id}"), name));
        self
    }

    /// Clears the input only after `delay` once Enter is pressed.
    #[must_use]
    pub fn with_submit_delay(self, delay: Duration) -> Self {
        self.inner.state.lock().submit_delay = Some(delay);
        self
    }

    /// Changes the path only after `delay` once a link is clicked.
    #[must_use]
    pub fn with_navigation_delay(self, delay: Duration) -> Self {
        self.inner.state.lock().navigation_delay = Some(delay);
        self
    }

    /// Removes the chat input element.
    #[must_use]
    pub fn without_input(self) -> Self {
        self.inner.state.lock().input = None;
        self
    }

    /// Never clears the input after Enter.
    #[must_use]
    pub fn with_stalled_submit(self) -> Self {
        self.inner.state.lock().submit_stalled = true;
        self
    }

    /// Removes every link with the given href.
    #[must_use]
    pub fn without_link(self, href: &str) -> Self {
        self.inner.state.lock().links.retain(|l| l.href != href);
        self
    }

    /// Opens a confirmation dialog and notifies observers.
    pub fn show_dialog(&self, prompt: impl Into<String>, buttons: &[&str]) {
        self.inner.state.lock().dialog = Some(ConfirmationDialog {
            prompt: prompt.into(),
            buttons: buttons.iter().map(|b| (*b).to_string()).collect(),
        });
        self.notify();
    }

    /// Texts submitted so far, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<String> {
        self.inner.state.lock().submitted.clone()
    }

    /// Dialog button labels clicked so far, in order.
    #[must_use]
    pub fn clicked_buttons(&self) -> Vec<String> {
        self.inner.state.lock().clicked_buttons.clone()
    }

    /// Returns `true` if a dialog is open.
    #[must_use]
    pub fn has_dialog(&self) -> bool {
        self.inner.state.lock().dialog.is_some()
    }

    fn notify(&self) {
        // No receivers is fine.
        let _ = self.inner.mutations.send(());
    }

    fn missing_input() -> Error {
        Error::element_not_found(CHAT_INPUT)
    }

    fn clear_input(&self) {
        if let Some(input) = self.inner.state.lock().input.as_mut() {
            input.clear();
        }
        self.notify();
    }

    fn navigate(&self, path: String) {
        trace!(%path, "Page navigated");
        self.inner.state.lock().path = path;
        self.notify();
    }
}

// ============================================================================
// Page Implementation
// ============================================================================

impl Page for MemoryPage {
    fn input_text(&self) -> Option<String> {
        self.inner.state.lock().input.clone()
    }

    fn set_input_text(&self, text: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let input = state.input.as_mut().ok_or_else(Self::missing_input)?;
            *input = text.to_string();
        }
        self.notify();
        Ok(())
    }

    fn press_enter(&self) -> Result<()> {
        let (stalled, delay) = {
            let mut state = self.inner.state.lock();
            let text = state.input.clone().ok_or_else(Self::missing_input)?;
            state.submitted.push(text);
            (state.submit_stalled, state.submit_delay)
        };

        match (stalled, delay) {
            (true, _) => {}
            (false, Some(delay)) => {
                let page = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    page.clear_input();
                });
            }
            (false, None) => self.clear_input(),
        }

        Ok(())
    }

    fn location_path(&self) -> String {
        self.inner.state.lock().path.clone()
    }

    fn find_link(&self, query: &LinkQuery) -> Option<Link> {
        let state = self.inner.state.lock();
        let on_projects = state.path == PROJECTS_HREF;

        state
            .links
            .iter()
            .chain(state.projects.iter().filter(|_| on_projects))
            .find(|link| query.matches(link))
            .cloned()
    }

    fn click_link(&self, link: &Link) -> Result<()> {
        let path = link.target_path()?;
        let delay = self.inner.state.lock().navigation_delay;

        match delay {
            Some(delay) => {
                let page = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    page.navigate(path);
                });
            }
            None => self.navigate(path),
        }

        Ok(())
    }

    fn confirmation_dialog(&self) -> Option<ConfirmationDialog> {
        self.inner.state.lock().dialog.clone()
    }

    fn click_dialog_button(&self, label: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let button = state
                .dialog
                .as_ref()
                .and_then(|d| d.buttons.iter().find(|b| b.contains(label)))
                .cloned()
                .ok_or_else(|| Error::element_not_found(format!("dialog button '{label}'")))?;

            state.clicked_buttons.push(button);
            state.dialog = None;
        }
        self.notify();
        Ok(())
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<()> {
        self.inner.mutations.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_round_trip() {
        let page = MemoryPage::new();
        page.set_input_text("hello").expect("set");
        assert_eq!(page.input_text().as_deref(), Some("hello"));
    }

    #[test]
    fn test_missing_input_errors() {
        let page = MemoryPage::new().without_input();
        assert!(page.input_text().is_none());
        assert!(page.set_input_text("x").unwrap_err().is_element_error());
        assert!(page.press_enter().unwrap_err().is_element_error());
    }

    #[tokio::test]
    async fn test_press_enter_submits_and_clears() {
        let page = MemoryPage::new();
        page.set_input_text("question").expect("set");
        page.press_enter().expect("enter");

        assert_eq!(page.submitted(), vec!["question".to_string()]);
        assert_eq!(page.input_text().as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_delay() {
        let page = MemoryPage::new().with_submit_delay(Duration::from_millis(30));
        page.set_input_text("slow").expect("set");
        page.press_enter().expect("enter");
        assert_eq!(page.input_text().as_deref(), Some("slow"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(page.input_text().as_deref(), Some(""));
    }

    #[test]
    fn test_projects_only_visible_on_projects_page() {
        let page = MemoryPage::new().with_project("p1", "Research");
        let query = LinkQuery::ProjectName("Research".into());
        assert!(page.find_link(&query).is_none());

        page.navigate(PROJECTS_HREF.to_string());
        assert_eq!(page.find_link(&query).map(|l| l.href), Some("/project/p1".into()));
    }

    #[test]
    fn test_dialog_click_closes_dialog() {
        let page = MemoryPage::new();
        let mut rx = page.subscribe_mutations();

        page.show_dialog("Run read_file from fs", &["Deny", "Allow for This Chat"]);
        assert!(rx.try_recv().is_ok());

        page.click_dialog_button("Allow for This Chat").expect("click");
        assert!(!page.has_dialog());
        assert_eq!(page.clicked_buttons(), vec!["Allow for This Chat".to_string()]);
        assert!(page.click_dialog_button("Allow").is_err());
    }
}
