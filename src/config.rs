//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Story Vision, supporting:
//! - Environment variables for all configurable values
//! - Defaults suitable for a local OpenAI-compatible endpoint and headless Chromium
//! - Builder-style overrides from CLI flags
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `STORY_VISION_LLM_ENDPOINT` | Chat-completions endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `STORY_VISION_LLM_MODEL` | Model used for steps and page analysis | `gemini-2.0-flash` |
//! | `STORY_VISION_LLM_MAX_TOKENS` | Maximum tokens in a response | `1024` |
//! | `STORY_VISION_LLM_TIMEOUT` | Streaming activity timeout in seconds | `60` |
//! | `STORY_VISION_LLM_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `STORY_VISION_LLM_API_KEY` | Optional bearer token | unset |
//! | `STORY_VISION_RESULTS_DIR` | Base directory for run artifacts | `./test_results` |
//! | `STORY_VISION_HEADLESS` | Run Chromium without a window | `true` |
//! | `STORY_VISION_VIEWPORT` | Browser viewport | `1280x720` |
//! | `STORY_VISION_SELECTOR_TIMEOUT_MS` | Element visibility wait | `10000` |
//! | `STORY_VISION_NAVIGATION_TIMEOUT_MS` | Page load wait | `30000` |
//!
//! # Example
//!
//! ```bash
//! export STORY_VISION_LLM_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export STORY_VISION_LLM_MODEL="llava"
//! export STORY_VISION_HEADLESS=false
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default chat-completions endpoint
pub const DEFAULT_LLM_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default model name
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";

/// Default max tokens for model responses
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 1024;

/// Default connection timeout (seconds)
pub const DEFAULT_LLM_CONNECT_TIMEOUT: u64 = 10;

/// Default activity timeout (seconds)
pub const DEFAULT_LLM_ACTIVITY_TIMEOUT: u64 = 60;

/// Default base directory for run artifacts
pub const DEFAULT_RESULTS_DIR: &str = "./test_results";

/// Default viewport width (pixels)
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height (pixels)
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Default wait for an element to become visible (milliseconds)
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 10_000;

/// Default wait for a navigation to settle (milliseconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_LLM_ENDPOINT: &str = "STORY_VISION_LLM_ENDPOINT";
pub const ENV_LLM_MODEL: &str = "STORY_VISION_LLM_MODEL";
pub const ENV_LLM_MAX_TOKENS: &str = "STORY_VISION_LLM_MAX_TOKENS";
pub const ENV_LLM_CONNECT_TIMEOUT: &str = "STORY_VISION_LLM_CONNECT_TIMEOUT";
pub const ENV_LLM_ACTIVITY_TIMEOUT: &str = "STORY_VISION_LLM_TIMEOUT";
pub const ENV_LLM_API_KEY: &str = "STORY_VISION_LLM_API_KEY";
pub const ENV_RESULTS_DIR: &str = "STORY_VISION_RESULTS_DIR";
pub const ENV_HEADLESS: &str = "STORY_VISION_HEADLESS";
pub const ENV_VIEWPORT: &str = "STORY_VISION_VIEWPORT";
pub const ENV_SELECTOR_TIMEOUT: &str = "STORY_VISION_SELECTOR_TIMEOUT_MS";
pub const ENV_NAVIGATION_TIMEOUT: &str = "STORY_VISION_NAVIGATION_TIMEOUT_MS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Story Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// Language/vision model configuration
    pub llm: LlmSettings,
    /// Browser configuration
    pub browser: BrowserSettings,
    /// Artifact storage configuration
    pub results: ResultsSettings,
}

/// Model endpoint settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Activity timeout during streaming (seconds)
    pub activity_timeout: u64,
    /// Bearer token sent as `Authorization` header
    pub api_key: Option<String>,
}

/// Browser launch and wait settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
    /// Maximum wait for an element to become visible
    pub selector_timeout_ms: u64,
    /// Maximum wait for a navigation to settle
    pub navigation_timeout_ms: u64,
}

/// Where run artifacts are written
#[derive(Debug, Clone)]
pub struct ResultsSettings {
    /// Base directory for sessions
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            llm: LlmSettings::from_env(),
            browser: BrowserSettings::from_env(),
            results: ResultsSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            llm: LlmSettings::defaults(),
            browser: BrowserSettings::defaults(),
            results: ResultsSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_LLM_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_LLM_ENDPOINT.to_string()),
            model: env::var(ENV_LLM_MODEL).unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            max_tokens: parse_env(ENV_LLM_MAX_TOKENS).unwrap_or(DEFAULT_LLM_MAX_TOKENS),
            connect_timeout: parse_env(ENV_LLM_CONNECT_TIMEOUT)
                .unwrap_or(DEFAULT_LLM_CONNECT_TIMEOUT),
            activity_timeout: parse_env(ENV_LLM_ACTIVITY_TIMEOUT)
                .unwrap_or(DEFAULT_LLM_ACTIVITY_TIMEOUT),
            api_key: env::var(ENV_LLM_API_KEY).ok().filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
            connect_timeout: DEFAULT_LLM_CONNECT_TIMEOUT,
            activity_timeout: DEFAULT_LLM_ACTIVITY_TIMEOUT,
            api_key: None,
        }
    }
}

impl BrowserSettings {
    pub fn from_env() -> Self {
        let (viewport_width, viewport_height) = env::var(ENV_VIEWPORT)
            .ok()
            .and_then(|s| parse_viewport(&s))
            .unwrap_or((DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT));

        Self {
            headless: env::var(ENV_HEADLESS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
            viewport_width,
            viewport_height,
            selector_timeout_ms: parse_env(ENV_SELECTOR_TIMEOUT)
                .unwrap_or(DEFAULT_SELECTOR_TIMEOUT_MS),
            navigation_timeout_ms: parse_env(ENV_NAVIGATION_TIMEOUT)
                .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
        }
    }

    pub fn defaults() -> Self {
        Self {
            headless: true,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            selector_timeout_ms: DEFAULT_SELECTOR_TIMEOUT_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        get().browser.clone()
    }
}

impl ResultsSettings {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_RESULTS_DIR).unwrap_or_else(|_| DEFAULT_RESULTS_DIR.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_RESULTS_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a viewport string such as "1280x720" into (width, height)
pub fn parse_viewport(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().to_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().to_string(), h.trim().to_string())
    })?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the results base directory (convenience function)
pub fn results_base_dir() -> String {
    get().results.base_dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("1280x720"), Some((1280, 720)));
        assert_eq!(parse_viewport(" 800X600 "), Some((800, 600)));
    }

    #[test]
    fn test_parse_viewport_invalid() {
        assert_eq!(parse_viewport("wide"), None);
        assert_eq!(parse_viewport("1280"), None);
        assert_eq!(parse_viewport("0x720"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.llm.endpoint, DEFAULT_LLM_ENDPOINT);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.llm.api_key.is_none());
        assert!(config.browser.headless);
        assert_eq!(config.browser.viewport_width, 1280);
        assert_eq!(config.results.base_dir, DEFAULT_RESULTS_DIR);
    }
}
