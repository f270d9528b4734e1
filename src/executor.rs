//! Action executor.
//!
//! Runs one [`TestStep`] against a [`BrowserPage`] and records the outcome on
//! the step. Nothing escapes [`Executor::execute`]: browser errors, missing
//! fields and unknown actions all become `Fail` with a note, and every
//! attempt ends with a best-effort screenshot.

use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserPage};
use crate::config::BrowserSettings;
use crate::snapshot::{ScreenshotStore, ShotKind, SnapshotError};
use crate::steps::{StepAction, TestStep};

/// Why a step handler could not complete
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("{action} requires {field}")]
    MissingField { action: String, field: &'static str },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Normal result of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass(String),
    /// A check that did not hold; not an error
    Fail(String),
}

type StepFuture<'a> = BoxFuture<'a, Result<Outcome, StepError>>;

/// Handler signature shared by every action
type Handler = for<'a> fn(&'a Executor, &'a mut TestStep, &'a mut dyn BrowserPage) -> StepFuture<'a>;

/// Mapping from action kind to its handler; `Unknown` has none
fn handler_for(action: &StepAction) -> Option<Handler> {
    let handler: Handler = match action {
        StepAction::Navigate => navigate,
        StepAction::Click => click,
        StepAction::Type => type_text,
        StepAction::Select => select,
        StepAction::Assert => assert_visible,
        StepAction::Wait => wait,
        StepAction::Hover => hover,
        StepAction::FileUpload => file_upload,
        StepAction::Screenshot => screenshot,
        StepAction::Unknown(_) => return None,
    };
    Some(handler)
}

/// Executes steps and stores their screenshots
#[derive(Debug, Clone)]
pub struct Executor {
    store: ScreenshotStore,
    selector_timeout: Duration,
    /// Upper bound for `wait` steps
    max_wait: Duration,
}

impl Executor {
    pub fn new(store: ScreenshotStore, settings: &BrowserSettings) -> Self {
        Self {
            store,
            selector_timeout: Duration::from_millis(settings.selector_timeout_ms),
            max_wait: Duration::from_millis(settings.navigation_timeout_ms),
        }
    }

    pub fn with_selector_timeout(mut self, timeout: Duration) -> Self {
        self.selector_timeout = timeout;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Execute one step and return it with status, notes and screenshot set.
    ///
    /// Re-executing a step overwrites the previous outcome.
    pub async fn execute(&self, mut step: TestStep, page: &mut dyn BrowserPage) -> TestStep {
        step.reset_outcome();
        debug!(step = step.step_number, action = %step.action, "executing step");

        let mut kind = ShotKind::Step;
        match handler_for(&step.action) {
            None => step.fail(format!("Unknown action: {}", step.action)),
            Some(handler) => {
                let result = handler(self, &mut step, &mut *page).await;
                match result {
                    Ok(Outcome::Pass(notes)) => step.pass(notes),
                    Ok(Outcome::Fail(notes)) => step.fail(notes),
                    Err(err) => {
                        warn!(step = step.step_number, action = %step.action, error = %err, "step raised an error");
                        step.fail(format!("Error: {}", err));
                        kind = ShotKind::ErrorStep;
                    }
                }
            }
        }

        if step.screenshot_path.is_none() {
            self.capture_best_effort(&mut step, page, kind).await;
        }

        info!(step = step.step_number, action = %step.action, status = %step.status, "step finished");
        step
    }

    /// Try to attach a screenshot to the step; failures are only logged
    async fn capture_best_effort(&self, step: &mut TestStep, page: &mut dyn BrowserPage, kind: ShotKind) {
        match self.capture(page, kind, step.step_number).await {
            Ok(path) => step.screenshot_path = Some(path),
            Err(err) => debug!(step = step.step_number, error = %err, "screenshot skipped"),
        }
    }

    async fn capture(&self, page: &mut dyn BrowserPage, kind: ShotKind, step_number: u32) -> Result<String, StepError> {
        let png = page.screenshot(false).await?;
        let mut extra = serde_json::Map::new();
        if let Ok(Some(url)) = page.url().await {
            extra.insert("url".to_string(), serde_json::Value::String(url));
        }
        let snapshot = self.store.persist(&png, kind, Some(step_number), extra)?;
        Ok(snapshot.image_path.display().to_string())
    }
}

fn require_selector(step: &TestStep) -> Result<String, StepError> {
    step.element_selector
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StepError::MissingField {
            action: step.action.to_string(),
            field: "element_selector",
        })
}

fn require_input(step: &TestStep, allow_blank: bool) -> Result<String, StepError> {
    step.input_value
        .as_deref()
        .filter(|v| allow_blank || !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| StepError::MissingField {
            action: step.action.to_string(),
            field: "input_value",
        })
}

/// Parse a `wait` duration in milliseconds
pub fn parse_wait_ms(value: &str) -> Result<u64, StepError> {
    value.trim().parse::<u64>().map_err(|e| {
        StepError::InvalidInput(format!(
            "wait expects a whole number of milliseconds, got '{}' ({})",
            value, e
        ))
    })
}

/// Clamp a requested wait to `max`, returning the milliseconds to wait and whether it was capped
pub fn cap_wait_ms(requested: u64, max: Duration) -> (u64, bool) {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if requested > max_ms {
        (max_ms, true)
    } else {
        (requested, false)
    }
}

/// Text to look for in a `text=...` assert selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLiteral<'a> {
    pub text: &'a str,
    /// Quoted literals must match an element's whole text, case included
    pub exact: bool,
}

/// Split an assert selector into a text literal (`text=...`) or a plain selector
pub fn text_literal(selector: &str) -> Option<TextLiteral<'_>> {
    let text = selector.trim().strip_prefix("text=")?;
    let quoted = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')));
    Some(match quoted {
        Some(text) => TextLiteral { text, exact: true },
        None => TextLiteral { text, exact: false },
    })
}

// ============================================================================
// Handlers
// ============================================================================

fn navigate<'a>(_: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let url = require_input(step, false)?;
        page.goto(url.trim()).await?;
        Ok(Outcome::Pass(format!("Navigated to {}", url)))
    })
}

fn click<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        page.wait_for_visible(&selector, exec.selector_timeout).await?;
        page.click(&selector).await?;
        Ok(Outcome::Pass(format!("Clicked on {}", selector)))
    })
}

fn type_text<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        let value = require_input(step, true)?;
        page.wait_for_visible(&selector, exec.selector_timeout).await?;
        page.fill(&selector, &value).await?;
        Ok(Outcome::Pass(format!("Typed '{}' into {}", value, selector)))
    })
}

fn select<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        let value = require_input(step, true)?;
        page.wait_for_visible(&selector, exec.selector_timeout).await?;
        page.select_option(&selector, &value).await?;
        Ok(Outcome::Pass(format!("Selected '{}' from {}", value, selector)))
    })
}

fn assert_visible<'a>(_: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        let outcome = match text_literal(&selector) {
            Some(TextLiteral { text, exact }) => {
                if page.is_text_visible(text, exact).await? {
                    Outcome::Pass(format!("Text '{}' is visible on the page", text))
                } else {
                    Outcome::Fail(format!("Text '{}' is not visible on the page", text))
                }
            }
            None => {
                if page.is_visible(&selector).await? {
                    Outcome::Pass(format!("Element {} is visible", selector))
                } else {
                    Outcome::Fail(format!("Element {} is not visible", selector))
                }
            }
        };
        Ok(outcome)
    })
}

fn wait<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let raw = require_input(step, false)?;
        let requested = parse_wait_ms(&raw)?;
        let (ms, capped) = cap_wait_ms(requested, exec.max_wait);
        if capped {
            warn!(step = step.step_number, requested, capped_to = ms, "wait exceeds the navigation timeout");
        }
        page.wait(ms).await?;
        Ok(Outcome::Pass(if capped {
            format!("Waited for {}ms (capped from {}ms)", ms, requested)
        } else {
            format!("Waited for {}ms", ms)
        }))
    })
}

fn hover<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        page.wait_for_visible(&selector, exec.selector_timeout).await?;
        page.hover(&selector).await?;
        Ok(Outcome::Pass(format!("Hovered over {}", selector)))
    })
}

fn file_upload<'a>(_: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let selector = require_selector(step)?;
        let file = require_input(step, false)?;
        let file = file.trim().to_string();
        if tokio::fs::metadata(Path::new(&file)).await.is_err() {
            return Err(StepError::InvalidInput(format!("file '{}' does not exist", file)));
        }
        page.set_input_files(&selector, std::slice::from_ref(&file)).await?;
        Ok(Outcome::Pass(format!("Uploaded file {} to {}", file, selector)))
    })
}

fn screenshot<'a>(exec: &'a Executor, step: &'a mut TestStep, page: &'a mut dyn BrowserPage) -> StepFuture<'a> {
    Box::pin(async move {
        let path = exec.capture(page, ShotKind::Step, step.step_number).await?;
        step.screenshot_path = Some(path.clone());
        Ok(Outcome::Pass(format!("Screenshot saved to {}", path)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wait_ms() {
        assert_eq!(parse_wait_ms("1500").unwrap(), 1500);
        assert_eq!(parse_wait_ms(" 20 ").unwrap(), 20);
        let err = parse_wait_ms("abc").unwrap_err();
        assert!(err.to_string().contains("'abc'"));
        assert!(parse_wait_ms("-5").is_err());
    }

    #[test]
    fn test_cap_wait_ms() {
        let max = Duration::from_millis(30_000);
        assert_eq!(cap_wait_ms(1500, max), (1500, false));
        assert_eq!(cap_wait_ms(30_000, max), (30_000, false));
        assert_eq!(cap_wait_ms(99_999_999_999, max), (30_000, true));
    }

    #[test]
    fn test_text_literal() {
        assert_eq!(text_literal("text=Welcome"), Some(TextLiteral { text: "Welcome", exact: false }));
        assert_eq!(text_literal("text=\"Sign in\""), Some(TextLiteral { text: "Sign in", exact: true }));
        assert_eq!(text_literal("text='Sign in'"), Some(TextLiteral { text: "Sign in", exact: true }));
        assert_eq!(text_literal("#welcome"), None);
    }

    #[test]
    fn test_every_known_action_has_a_handler() {
        for action in StepAction::KNOWN.iter() {
            assert!(handler_for(action).is_some(), "no handler for {}", action);
        }
        assert!(handler_for(&StepAction::Unknown("drag".into())).is_none());
    }

    #[test]
    fn test_missing_selector_message() {
        let step = TestStep::new(1, StepAction::Click);
        let err = require_selector(&step).unwrap_err();
        assert_eq!(err.to_string(), "click requires element_selector");

        let blank = TestStep::new(1, StepAction::Click).selector("   ");
        assert!(require_selector(&blank).is_err());
    }

    #[test]
    fn test_type_allows_blank_input() {
        let step = TestStep::new(2, StepAction::Type).selector("#q").input("");
        assert_eq!(require_input(&step, true).unwrap(), "");
        assert!(require_input(&step, false).is_err());
    }
}
