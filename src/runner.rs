//! Run orchestration.
//!
//! Drives each user story through `NotRun -> Running -> {Pass, Fail, Error}`
//! on one shared page. Stories run strictly in sequence, steps strictly in
//! order. Step failures are recorded data; anything that escapes a story
//! (generator failure, panic) marks only that story as `Error` and the batch
//! continues.

use anyhow::Result;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analyzer::{PageAnalysisService, PageAnalyzer};
use crate::browser::{BrowserPage, BrowserResult, BrowserSession};
use crate::config::BrowserSettings;
use crate::executor::Executor;
use crate::report::Reporter;
use crate::snapshot::ScreenshotStore;
use crate::steps::{CaseStatus, RawStep, StepGenerator, StepStatus, TestCase, TestStep};

/// Results of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// One entry per input story, in input order
    pub test_cases: Vec<TestCase>,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn from_cases(test_cases: Vec<TestCase>) -> Self {
        let count = |status: CaseStatus| test_cases.iter().filter(|c| c.status == status).count();
        let passed = count(CaseStatus::Pass);
        let failed = count(CaseStatus::Fail);
        let errors = count(CaseStatus::Error);
        Self {
            test_cases,
            passed,
            failed,
            errors,
        }
    }

    /// `(total, passed, failed, errors)`
    pub fn totals(&self) -> (usize, usize, usize, usize) {
        (self.test_cases.len(), self.passed, self.failed, self.errors)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// Owns the collaborators of a run and sequences them per story
pub struct Orchestrator {
    generator: Arc<dyn StepGenerator>,
    analyzer: PageAnalyzer,
    executor: Executor,
    reporter: Arc<dyn Reporter>,
    settings: BrowserSettings,
    interim_analysis: bool,
}

impl Orchestrator {
    /// Screenshots from steps and analyses go to `store`
    pub fn new(
        generator: Arc<dyn StepGenerator>,
        analysis_service: Arc<dyn PageAnalysisService>,
        reporter: Arc<dyn Reporter>,
        store: ScreenshotStore,
        settings: BrowserSettings,
    ) -> Self {
        Self {
            generator,
            analyzer: PageAnalyzer::new(analysis_service, store.clone()),
            executor: Executor::new(store, &settings),
            reporter,
            settings,
            interim_analysis: true,
        }
    }

    /// Toggle the page analysis after every passing step
    pub fn interim_analysis(mut self, enabled: bool) -> Self {
        self.interim_analysis = enabled;
        self
    }

    /// Replace the executor (e.g. to shorten selector timeouts)
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Launch a browser, run every story on it, then close it.
    ///
    /// Only a failed launch is an error; everything after it is reported in
    /// the summary.
    pub async fn run_with_browser(&self, stories: &[String]) -> BrowserResult<RunSummary> {
        let mut session = BrowserSession::start(self.settings.clone()).await?;
        Ok(self.run_and_close(stories, &mut session).await)
    }

    /// Run every story on `page` and close it afterwards, whatever happened
    pub async fn run_and_close(&self, stories: &[String], page: &mut dyn BrowserPage) -> RunSummary {
        let summary = self.run(stories, page).await;
        if let Err(e) = page.close().await {
            error!(error = %e, "browser teardown failed");
        }
        summary
    }

    /// Run every story on an already open page
    pub async fn run(&self, stories: &[String], page: &mut dyn BrowserPage) -> RunSummary {
        info!(stories = stories.len(), "starting run");
        let mut cases = Vec::with_capacity(stories.len());
        for (index, story) in stories.iter().enumerate() {
            cases.push(self.process_story(index, story, page).await);
        }

        let summary = RunSummary::from_cases(cases);
        let (total, passed, failed, errors) = summary.totals();
        info!(total, passed, failed, errors, "run finished");
        summary
    }

    /// Take one story from generation to report
    pub async fn process_story(&self, index: usize, story: &str, page: &mut dyn BrowserPage) -> TestCase {
        let mut case = TestCase::new(format!("TC_{}", index + 1), story);
        case.status = CaseStatus::Running;
        info!(case = %case.id, story, "processing user story");

        let outcome = AssertUnwindSafe(self.drive(&mut case, &mut *page)).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{:#}", err)),
            Err(panic) => Some(format!("panic: {}", panic_message(panic.as_ref()))),
        };
        if let Some(reason) = failure {
            error!(case = %case.id, error = %reason, "user story aborted");
            case.status = CaseStatus::Error;
            case.summary = format!("An error occurred: {}", reason);
        }

        case.finish();
        let report = self.reporter.generate_report(&case);
        case.html_report_path = Some(report);

        info!(
            case = %case.id,
            status = %case.status,
            duration = case.duration_seconds.unwrap_or_default(),
            "user story finished"
        );
        case
    }

    async fn drive(&self, case: &mut TestCase, page: &mut dyn BrowserPage) -> Result<()> {
        let mut raw = self.generator.generate_steps(&case.user_story).await?;
        if raw.is_empty() {
            warn!(case = %case.id, "generator returned no steps, using placeholder step");
            raw.push(RawStep::fallback());
        }
        case.steps = raw.into_iter().map(TestStep::from).collect();
        debug!(case = %case.id, steps = case.steps.len(), "steps generated");

        let mut all_passed = true;
        for index in 0..case.steps.len() {
            let step = case.steps[index].clone();
            let step = self.executor.execute(step, &mut *page).await;
            if step.status != StepStatus::Pass {
                all_passed = false;
                info!(
                    case = %case.id,
                    step = step.step_number,
                    notes = step.notes.as_deref().unwrap_or_default(),
                    "step did not pass"
                );
            } else if self.interim_analysis {
                let analysis = self.analyzer.analyze(&mut *page).await;
                let preview: String = analysis.summary.chars().take(100).collect();
                debug!(case = %case.id, step = step.step_number, analysis = %preview, "interim page analysis");
            }
            case.steps[index] = step;
        }

        let analysis = self.analyzer.analyze(&mut *page).await;
        case.summary = analysis.summary;
        case.status = if all_passed { CaseStatus::Pass } else { CaseStatus::Fail };
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_with(status: CaseStatus) -> TestCase {
        let mut case = TestCase::new("TC_1", "story");
        case.status = status;
        case
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary::from_cases(vec![
            case_with(CaseStatus::Pass),
            case_with(CaseStatus::Fail),
            case_with(CaseStatus::Error),
            case_with(CaseStatus::Pass),
        ]);
        assert_eq!(summary.totals(), (4, 2, 1, 1));
    }

    #[test]
    fn test_summary_json_uses_status_strings() {
        let summary = RunSummary::from_cases(vec![case_with(CaseStatus::Error)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["errors"], 1);
        assert_eq!(json["test_cases"][0]["status"], "Error");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
