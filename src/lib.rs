//! Story Vision - browser test automation driven by user stories.
//!
//! This crate provides:
//! - Step generation from natural-language user stories via an LLM
//! - A Chromium session primitive over the DevTools protocol
//! - An action executor with best-effort screenshots per step
//! - Vision model page analysis
//! - Run orchestration with per-story Pass/Fail/Error classification
//! - HTML reports and per-run artifact directories
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use story_vision::{HtmlReporter, LlmStepGenerator, Orchestrator, Session, VlmAnalysisService, VlmConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let session = Session::with_name("login");
//! session.init()?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(LlmStepGenerator::from_config(VlmConfig::default())),
//!     Arc::new(VlmAnalysisService::new(VlmConfig::default())),
//!     Arc::new(HtmlReporter::new(session.reports_dir())),
//!     session.screenshot_store(),
//!     Default::default(),
//! );
//! let summary = orchestrator
//!     .run_with_browser(&["As a user, I want to log in".to_string()])
//!     .await?;
//! println!("{} passed", summary.passed);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod browser;
pub mod config;
pub mod executor;
pub mod report;
pub mod runner;
pub mod session;
pub mod snapshot;
pub mod steps;
pub mod stories;
pub mod vlm;

// Re-export runner types
pub use runner::{Orchestrator, RunSummary};

// Re-export step model and generation
pub use steps::{
    CaseStatus, GeneratorError, LlmStepGenerator, RawStep, StepAction, StepGenerator, StepStatus, TestCase,
    TestStep,
};

// Re-export browser, executor and analyzer
pub use analyzer::{PageAnalysis, PageAnalysisService, PageAnalyzer, VlmAnalysisService};
pub use browser::{BrowserError, BrowserPage, BrowserResult, BrowserSession};
pub use executor::{Executor, StepError};

// Re-export reporting, stories and session management
pub use report::{HtmlReporter, ReportError, Reporter};
pub use session::Session;
pub use stories::{StoryError, load_user_stories};

// Re-export VLM client
pub use vlm::{VlmConfig, VlmError, VlmResult, check_health};
