//! Browser session primitive.
//!
//! [`BrowserPage`] is the set of page operations the executor and analyzer
//! need. [`BrowserSession`] implements it over Chromium via the DevTools
//! protocol; tests implement it with scripted pages.

pub mod chrome;
pub mod scripts;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use chrome::BrowserSession;

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors raised by browser operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrowserError {
    /// Browser process could not be started or configured
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element '{0}' not found")]
    ElementNotFound(String),

    /// A bounded wait expired
    #[error("Timeout after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// In-page script failed or returned an unexpected value
    #[error("Script error: {0}")]
    Script(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    /// Any other DevTools protocol failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session was already closed
    #[error("Browser session is closed")]
    Closed,
}

/// Operations on the single active page of a session.
///
/// Every method is one suspension point; callers await each in turn.
#[async_trait]
pub trait BrowserPage: Send {
    /// Load a URL and wait until the page has settled
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;

    /// Wait until the element matching `selector` is visible
    async fn wait_for_visible(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    async fn click(&mut self, selector: &str) -> BrowserResult<()>;

    /// Replace the element's content with `value`
    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<()>;

    /// Choose the `<option>` whose value equals `value`
    async fn select_option(&mut self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool>;

    /// Whether `text` is rendered visibly anywhere on the page.
    ///
    /// Loose matches ignore case and find substrings; `exact` requires an
    /// element whose whole text equals `text`. Whitespace is normalized either way.
    async fn is_text_visible(&mut self, text: &str, exact: bool) -> BrowserResult<bool>;

    async fn hover(&mut self, selector: &str) -> BrowserResult<()>;

    /// Attach local files to a file input
    async fn set_input_files(&mut self, selector: &str, files: &[String]) -> BrowserResult<()>;

    /// PNG bytes of the viewport, or of the whole page when `full_page`
    async fn screenshot(&mut self, full_page: bool) -> BrowserResult<Vec<u8>>;

    /// Evaluate a script expression and return its JSON value
    async fn evaluate(&mut self, script: &str) -> BrowserResult<serde_json::Value>;

    /// Pause for `ms` milliseconds
    async fn wait(&mut self, ms: u64) -> BrowserResult<()> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn url(&mut self) -> BrowserResult<Option<String>>;

    async fn title(&mut self) -> BrowserResult<Option<String>>;

    /// Release the page and whatever owns it; later calls are no-ops
    async fn close(&mut self) -> BrowserResult<()> {
        Ok(())
    }
}
