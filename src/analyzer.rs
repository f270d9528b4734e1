//! Page analysis with a vision model.
//!
//! Captures a full-page screenshot and the visible text, then asks the model
//! for a summary. Failures never propagate: they become the summary text.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::browser::{scripts, BrowserPage};
use crate::snapshot::{ScreenshotStore, ShotKind};
use crate::vlm::{self, VlmConfig, VlmError};

/// Fixed instructions sent with every page screenshot
pub const ANALYSIS_PROMPT: &str = "Analyze this web page and provide a summary of:
1. The main purpose of the page
2. Key UI elements visible (forms, buttons, etc.)
3. Any potential validation or error messages
4. Current state of the application based on the screenshot

Be concise but thorough.";

/// Visible text beyond this many characters is cut from the prompt
const MAX_CONTEXT_CHARS: usize = 4000;

/// Multimodal model that describes a screenshot
#[async_trait]
pub trait PageAnalysisService: Send + Sync {
    async fn describe(&self, prompt: &str, png: &[u8]) -> Result<String, VlmError>;
}

/// [`PageAnalysisService`] over the chat-completions endpoint
#[derive(Debug, Clone)]
pub struct VlmAnalysisService {
    config: VlmConfig,
}

impl VlmAnalysisService {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageAnalysisService for VlmAnalysisService {
    async fn describe(&self, prompt: &str, png: &[u8]) -> Result<String, VlmError> {
        let config = self.config.clone();
        let prompt = prompt.to_string();
        let png = png.to_vec();
        tokio::task::spawn_blocking(move || vlm::analyze_image(&config, &png, &prompt))
            .await
            .map_err(|e| VlmError::Io(std::io::Error::other(e.to_string())))?
    }
}

/// Result of one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    /// Model summary, or "Error analyzing page: ..." on failure
    pub summary: String,
    pub screenshot_path: Option<String>,
    pub timestamp: DateTime<Local>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub visible_text: String,
}

/// Build the analysis prompt with page context appended
pub fn build_analysis_prompt(url: Option<&str>, title: Option<&str>, visible_text: &str) -> String {
    let mut prompt = ANALYSIS_PROMPT.to_string();
    if url.is_some() || title.is_some() || !visible_text.is_empty() {
        prompt.push_str("\n\nPage context:");
        if let Some(url) = url {
            prompt.push_str(&format!("\nURL: {}", url));
        }
        if let Some(title) = title {
            prompt.push_str(&format!("\nTitle: {}", title));
        }
        if !visible_text.is_empty() {
            let text: String = visible_text.chars().take(MAX_CONTEXT_CHARS).collect();
            prompt.push_str(&format!("\nVisible text: {}", text));
        }
    }
    prompt
}

/// Collapse runs of whitespace in extracted page text
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Summarizes the current page state
#[derive(Clone)]
pub struct PageAnalyzer {
    service: Arc<dyn PageAnalysisService>,
    store: ScreenshotStore,
}

impl PageAnalyzer {
    pub fn new(service: Arc<dyn PageAnalysisService>, store: ScreenshotStore) -> Self {
        Self { service, store }
    }

    pub async fn analyze(&self, page: &mut dyn BrowserPage) -> PageAnalysis {
        let url = page.url().await.ok().flatten();
        let title = page.title().await.ok().flatten();
        let visible_text = match page.evaluate(scripts::VISIBLE_TEXT).await {
            Ok(value) => normalize_text(value.as_str().unwrap_or_default()),
            Err(e) => {
                debug!(error = %e, "visible text extraction failed");
                String::new()
            }
        };

        let mut analysis = PageAnalysis {
            summary: String::new(),
            screenshot_path: None,
            timestamp: Local::now(),
            url,
            title,
            visible_text,
        };

        let png = match page.screenshot(true).await {
            Ok(png) => png,
            Err(e) => {
                warn!(error = %e, "analysis screenshot failed");
                analysis.summary = format!("Error analyzing page: {}", e);
                return analysis;
            }
        };

        let mut extra = serde_json::Map::new();
        if let Some(url) = &analysis.url {
            extra.insert("url".to_string(), serde_json::Value::String(url.clone()));
        }
        if let Some(title) = &analysis.title {
            extra.insert("title".to_string(), serde_json::Value::String(title.clone()));
        }
        match self.store.persist(&png, ShotKind::Analysis, None, extra) {
            Ok(snapshot) => analysis.screenshot_path = Some(snapshot.image_path.display().to_string()),
            Err(e) => debug!(error = %e, "analysis screenshot not saved"),
        }

        let prompt = build_analysis_prompt(
            analysis.url.as_deref(),
            analysis.title.as_deref(),
            &analysis.visible_text,
        );
        analysis.summary = match self.service.describe(&prompt, &png).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "page analysis failed");
                format!("Error analyzing page: {}", e)
            }
        };
        analysis.timestamp = Local::now();
        analysis
    }
}
