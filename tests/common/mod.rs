//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use story_vision::analyzer::PageAnalysisService;
use story_vision::browser::scripts::text_matches;
use story_vision::browser::{BrowserError, BrowserPage, BrowserResult};
use story_vision::report::Reporter;
use story_vision::steps::{GeneratorError, RawStep, StepGenerator, TestCase};
use story_vision::vlm::VlmError;

/// Not a decodable image; the store only needs bytes
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really";

/// In-memory page: selectors in `visible` exist and are shown; each entry of
/// `texts` is the rendered text of one visible element
#[derive(Debug, Default)]
pub struct FakePage {
    pub visible: HashSet<String>,
    pub texts: Vec<String>,
    pub options: HashSet<String>,
    pub fail_screenshots: bool,
    pub current_url: Option<String>,
    /// Clicking this selector panics, like a crashed page driver
    pub panic_on: Option<String>,
    pub log: Vec<String>,
    pub closed: bool,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible(mut self, selectors: &[&str]) -> Self {
        self.visible.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.texts.push(text.to_string());
        self
    }

    pub fn with_option(mut self, value: &str) -> Self {
        self.options.insert(value.to_string());
        self
    }

    pub fn panicking_on(mut self, selector: &str) -> Self {
        self.visible.insert(selector.to_string());
        self.panic_on = Some(selector.to_string());
        self
    }

    pub fn without_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    fn require(&self, selector: &str) -> BrowserResult<()> {
        if self.visible.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    /// Calls made so far, excluding screenshots and page queries
    pub fn actions(&self) -> Vec<&str> {
        self.log.iter().map(String::as_str).collect()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        if url.contains("unreachable") {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        self.current_url = Some(url.to_string());
        self.log.push(format!("goto {}", url));
        Ok(())
    }

    async fn wait_for_visible(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        if self.visible.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                what: format!("'{}' to be visible", selector),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.require(selector)?;
        if self.panic_on.as_deref() == Some(selector) {
            panic!("page driver crashed clicking {}", selector);
        }
        self.log.push(format!("click {}", selector));
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<()> {
        self.require(selector)?;
        self.log.push(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> BrowserResult<()> {
        self.require(selector)?;
        if !self.options.contains(value) {
            return Err(BrowserError::Script(format!("no option with value '{}' in '{}'", value, selector)));
        }
        self.log.push(format!("select {} {}", selector, value));
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool> {
        Ok(self.visible.contains(selector))
    }

    async fn is_text_visible(&mut self, text: &str, exact: bool) -> BrowserResult<bool> {
        Ok(self.texts.iter().any(|t| text_matches(t, text, exact)))
    }

    async fn hover(&mut self, selector: &str) -> BrowserResult<()> {
        self.require(selector)?;
        self.log.push(format!("hover {}", selector));
        Ok(())
    }

    async fn set_input_files(&mut self, selector: &str, files: &[String]) -> BrowserResult<()> {
        self.require(selector)?;
        self.log.push(format!("upload {} {}", selector, files.join(",")));
        Ok(())
    }

    async fn screenshot(&mut self, _full_page: bool) -> BrowserResult<Vec<u8>> {
        if self.fail_screenshots {
            Err(BrowserError::Screenshot("target closed".to_string()))
        } else {
            Ok(FAKE_PNG.to_vec())
        }
    }

    async fn evaluate(&mut self, _script: &str) -> BrowserResult<serde_json::Value> {
        Ok(serde_json::Value::String(self.texts.join(" ")))
    }

    async fn wait(&mut self, ms: u64) -> BrowserResult<()> {
        self.log.push(format!("wait {}", ms));
        Ok(())
    }

    async fn url(&mut self) -> BrowserResult<Option<String>> {
        Ok(self.current_url.clone())
    }

    async fn title(&mut self) -> BrowserResult<Option<String>> {
        Ok(Some("Fake Page".to_string()))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// Generator replaying scripted replies in order; an exhausted script yields no steps
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Vec<RawStep>, GeneratorError>>>,
    pub stories: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<Vec<RawStep>, GeneratorError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            stories: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StepGenerator for ScriptedGenerator {
    async fn generate_steps(&self, story: &str) -> Result<Vec<RawStep>, GeneratorError> {
        self.stories.lock().unwrap().push(story.to_string());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Generator that panics, standing in for a bug inside story processing
pub struct PanickingGenerator;

#[async_trait]
impl StepGenerator for PanickingGenerator {
    async fn generate_steps(&self, _story: &str) -> Result<Vec<RawStep>, GeneratorError> {
        panic!("generator blew up")
    }
}

/// Analysis service counting calls; fails when `error` is set
#[derive(Default)]
pub struct ScriptedAnalysis {
    pub calls: Mutex<usize>,
    pub error: Option<String>,
}

impl ScriptedAnalysis {
    pub fn failing(reason: &str) -> Self {
        Self {
            calls: Mutex::new(0),
            error: Some(reason.to_string()),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PageAnalysisService for ScriptedAnalysis {
    async fn describe(&self, prompt: &str, _png: &[u8]) -> Result<String, VlmError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        match &self.error {
            Some(reason) => Err(VlmError::ConnectionFailed(reason.clone())),
            None => {
                let url = prompt
                    .lines()
                    .find_map(|l| l.strip_prefix("URL: "))
                    .unwrap_or("unknown");
                Ok(format!("analysis {} of {}", *calls, url))
            }
        }
    }
}

/// Reporter keeping every case it receives
#[derive(Default)]
pub struct RecordingReporter {
    pub cases: Mutex<Vec<TestCase>>,
}

impl Reporter for RecordingReporter {
    fn generate_report(&self, test_case: &TestCase) -> String {
        self.cases.lock().unwrap().push(test_case.clone());
        format!("reports/report_{}.html", test_case.id)
    }
}

pub fn raw(step_number: u32, action: &str, selector: Option<&str>, input: Option<&str>) -> RawStep {
    RawStep {
        step_number: Some(step_number),
        action: Some(action.to_string()),
        element_selector: selector.map(str::to_string),
        input_value: input.map(str::to_string),
        expected_result: None,
    }
}
