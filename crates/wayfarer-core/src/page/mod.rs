//! Page abstraction
//!
//! The interpreter never touches a live document directly; it goes through
//! the [`PageContext`] capability trait so it can be driven against a real
//! browser bridge or an in-memory fake interchangeably.

mod fake;

use async_trait::async_trait;
use thiserror::Error;

pub use fake::{FakeElement, FakePage};

/// Page-level failures, distinct from step semantics.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element is no longer attached: {0}")]
    Detached(String),

    #[error("page backend error: {0}")]
    Backend(String),
}

/// Opaque handle to an element resolved on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Capability interface over one live document.
///
/// The document is a single mutable resource: callers must not issue
/// concurrent mutating operations for the same task. Queries are cheap and
/// may be repeated freely.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Start loading `url`. Completion of the load is observed separately
    /// via [`PageContext::wait_for_load`] so callers can bound the wait.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Resolve when the current document has finished loading.
    async fn wait_for_load(&self) -> Result<(), PageError>;

    /// URL of the current document.
    fn current_url(&self) -> String;

    /// First element matching a CSS selector.
    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, PageError>;

    /// All elements matching a CSS selector.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError>;

    /// First descendant of `parent` matching a CSS selector.
    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, PageError>;

    /// All descendants of `parent` matching a CSS selector.
    async fn query_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError>;

    /// First interactive element (link, button, input) whose visible text
    /// contains `text`.
    async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, PageError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, PageError>;

    async fn outer_html(&self, element: &ElementHandle) -> Result<String, PageError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError>;

    /// Set an input's value. Framework-bound listeners are only triggered by
    /// synthesized events, so callers follow up with
    /// [`PageContext::dispatch_event`].
    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), PageError>;

    async fn dispatch_event(&self, element: &ElementHandle, event: &str) -> Result<(), PageError>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), PageError>;
}
