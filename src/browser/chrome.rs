//! Chromium-backed browser session over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{scripts, BrowserError, BrowserPage, BrowserResult};
use crate::config::BrowserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live browser with exactly one page.
///
/// Owned by whoever started it; [`BrowserSession::shutdown`] must be awaited to
/// shut the process down cleanly.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    settings: BrowserSettings,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page
    pub async fn start(settings: BrowserSettings) -> BrowserResult<Self> {
        info!(
            headless = settings.headless,
            width = settings.viewport_width,
            height = settings.viewport_height,
            "launching browser"
        );

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                ..Default::default()
            })
            .request_timeout(Duration::from_millis(settings.navigation_timeout_ms));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("failed to open page: {}", e)))?;

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            settings,
        })
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.settings
    }

    /// Close the page, then the browser, then join the protocol handler.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub async fn shutdown(&mut self) -> BrowserResult<()> {
        let mut first_error = None;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close page");
                first_error.get_or_insert(BrowserError::Protocol(e.to_string()));
            }
        }

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "failed to close browser");
                first_error.get_or_insert(BrowserError::Protocol(e.to_string()));
            }
            if let Err(e) = browser.wait().await {
                debug!(error = %e, "browser process wait failed");
            }
        }

        if let Some(handler) = self.handler.take() {
            if tokio::time::timeout(Duration::from_secs(5), handler).await.is_err() {
                debug!("CDP handler did not stop in time");
            }
        }

        info!("browser closed");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn page(&self) -> BrowserResult<&Page> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }

    async fn eval_bool(&self, script: &str) -> BrowserResult<bool> {
        let value = self.eval(script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn eval(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn find(&self, selector: &str) -> BrowserResult<chromiumoxide::element::Element> {
        self.page()?
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))
    }

    /// Evaluate `script` until it returns `true` or `timeout` expires
    async fn poll_until<F>(&self, script: &str, timeout: Duration, what: F) -> BrowserResult<()>
    where
        F: Fn() -> String,
    {
        let started = Instant::now();
        loop {
            if self.eval_bool(script).await? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(BrowserError::Timeout {
                    what: what(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.selector_timeout_ms)
    }

    /// Poll until the document reports `complete` or the navigation timeout expires
    async fn wait_for_load(&self, url: &str) -> BrowserResult<()> {
        let timeout_ms = self.settings.navigation_timeout_ms;
        let started = Instant::now();
        loop {
            let state = self.eval(scripts::READY_STATE).await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if started.elapsed() >= Duration::from_millis(timeout_ms) {
                return Err(BrowserError::Timeout {
                    what: format!("{} to finish loading", url),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserPage for BrowserSession {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        debug!(url, "navigating");
        let timeout = Duration::from_millis(self.settings.navigation_timeout_ms);
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    what: format!("navigation to {}", url),
                    timeout_ms: self.settings.navigation_timeout_ms,
                })
            }
        }
        self.wait_for_load(url).await
    }

    async fn wait_for_visible(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.poll_until(&scripts::element_visible(selector), timeout, || {
            format!("'{}' to be visible", selector)
        })
        .await
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.find(selector)
            .await?
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(format!("click on '{}' failed: {}", selector, e)))?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<()> {
        if self.eval_bool(&scripts::fill(selector, value)).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> BrowserResult<()> {
        match self.eval(&scripts::select_option(selector, value)).await? {
            serde_json::Value::Bool(true) => Ok(()),
            serde_json::Value::Bool(false) => Err(BrowserError::Script(format!(
                "no option with value '{}' in '{}'",
                value, selector
            ))),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn is_visible(&mut self, selector: &str) -> BrowserResult<bool> {
        self.eval_bool(&scripts::element_visible(selector)).await
    }

    async fn is_text_visible(&mut self, text: &str, exact: bool) -> BrowserResult<bool> {
        self.eval_bool(&scripts::text_visible(text, exact)).await
    }

    async fn hover(&mut self, selector: &str) -> BrowserResult<()> {
        let timeout = self.selector_timeout();
        self.wait_for_visible(selector, timeout).await?;
        self.find(selector)
            .await?
            .hover()
            .await
            .map_err(|e| BrowserError::Protocol(format!("hover over '{}' failed: {}", selector, e)))?;
        Ok(())
    }

    async fn set_input_files(&mut self, selector: &str, files: &[String]) -> BrowserResult<()> {
        // File inputs are often hidden behind styled buttons; attached is enough
        let timeout = self.selector_timeout();
        self.poll_until(&scripts::element_attached(selector), timeout, || {
            format!("'{}' to be attached", selector)
        })
        .await?;
        let element = self.find(selector).await?;
        let mut params = SetFileInputFilesParams::new(files.to_vec());
        params.object_id = Some(element.remote_object_id.clone());
        self.page()?
            .execute(params)
            .await
            .map_err(|e| BrowserError::Protocol(format!("file upload to '{}' failed: {}", selector, e)))?;
        Ok(())
    }

    async fn screenshot(&mut self, full_page: bool) -> BrowserResult<Vec<u8>> {
        self.page()?
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn evaluate(&mut self, script: &str) -> BrowserResult<serde_json::Value> {
        self.eval(script).await
    }

    async fn url(&mut self) -> BrowserResult<Option<String>> {
        self.page()?
            .url()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn title(&mut self) -> BrowserResult<Option<String>> {
        self.page()?
            .get_title()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.shutdown().await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            // No async cleanup in Drop; chromiumoxide kills the child process
            // when the Browser handle goes away.
            warn!("browser session dropped without shutdown()");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
