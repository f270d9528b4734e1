//! HTML reports for finished test cases.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use crate::session::sanitize_name;
use crate::snapshot::generate_timestamp;
use crate::steps::{StepStatus, TestCase};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Sink for completed test cases.
///
/// Implementations must not fail the run: on error they log and return an
/// empty path.
pub trait Reporter: Send + Sync {
    fn generate_report(&self, test_case: &TestCase) -> String;
}

/// Writes one self-contained HTML file per test case
#[derive(Debug, Clone)]
pub struct HtmlReporter {
    reports_dir: PathBuf,
}

impl HtmlReporter {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    /// Render and write the report, returning its path
    pub fn write_report(&self, test_case: &TestCase) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.reports_dir)?;
        let html = render_html(test_case, &self.reports_dir)?;
        let path = self.reports_dir.join(format!(
            "report_{}_{}.html",
            sanitize_name(&test_case.id),
            generate_timestamp()
        ));
        fs::write(&path, html)?;
        Ok(path)
    }
}

impl Reporter for HtmlReporter {
    fn generate_report(&self, test_case: &TestCase) -> String {
        match self.write_report(test_case) {
            Ok(path) => {
                info!(case = %test_case.id, path = %path.display(), "report written");
                path.display().to_string()
            }
            Err(e) => {
                error!(case = %test_case.id, error = %e, "report generation failed");
                String::new()
            }
        }
    }
}

/// CSS class suffix for a status ("Not Run" -> "not-run")
fn status_class(status: &str) -> String {
    status.to_lowercase().replace(' ', "-")
}

/// Make screenshot links relative to the report when they live below the same run dir
fn image_src(screenshot: &str, reports_dir: &Path) -> String {
    let shot = Path::new(screenshot);
    match (shot.parent(), reports_dir.parent()) {
        (Some(shot_dir), Some(run_dir)) if shot_dir.parent() == Some(run_dir) => {
            let dir_name = shot_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let file_name = shot.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            format!("../{}/{}", dir_name, file_name)
        }
        _ => screenshot.to_string(),
    }
}

const STYLE: &str = r#"body { font-family: Arial, sans-serif; line-height: 1.6; margin: 0; padding: 20px; color: #333; }
h1 { color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }
h2 { color: #2980b9; margin-top: 30px; }
.summary { background-color: #ecf0f1; padding: 15px; border-radius: 5px; margin: 20px 0; }
.test-info { display: flex; flex-wrap: wrap; }
.test-info div { margin-right: 30px; margin-bottom: 10px; }
.steps { width: 100%; border-collapse: collapse; margin: 20px 0; }
.steps th, .steps td { border: 1px solid #ddd; padding: 10px; text-align: left; }
.steps th { background-color: #f2f2f2; }
.step-pass { background-color: #d4edda; }
.step-fail { background-color: #f8d7da; }
.screenshot { max-width: 800px; margin: 10px 0; border: 1px solid #ddd; }
.status-pass { color: #28a745; font-weight: bold; }
.status-fail, .status-error { color: #dc3545; font-weight: bold; }
.status-not-run { color: #6c757d; font-weight: bold; }
.page-analysis { background-color: #e8f4f8; padding: 15px; border-radius: 5px; margin: 20px 0; white-space: pre-wrap; }"#;

/// Render a test case as an HTML document
pub fn render_html(test_case: &TestCase, reports_dir: &Path) -> Result<String, ReportError> {
    let mut html = String::new();
    let status = test_case.status.as_str();
    let time = |t: &Option<chrono::DateTime<chrono::Local>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_default()
    };
    let duration = test_case
        .duration_seconds
        .map(|d| format!("{:.2}", d))
        .unwrap_or_default();

    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">")?;
    writeln!(html, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">")?;
    writeln!(html, "<title>Test Report {}</title>", encode_text(&test_case.id))?;
    writeln!(html, "<style>\n{}\n</style>\n</head>\n<body>", STYLE)?;
    writeln!(html, "<h1>Automation Test Report</h1>")?;

    writeln!(html, "<div class=\"summary\">\n<h2>Test Summary</h2>\n<div class=\"test-info\">")?;
    writeln!(html, "<div><strong>Test Case:</strong> {}</div>", encode_text(&test_case.id))?;
    writeln!(html, "<div><strong>User Story:</strong> {}</div>", encode_text(&test_case.user_story))?;
    writeln!(
        html,
        "<div><strong>Status:</strong> <span class=\"status-{}\">{}</span></div>",
        status_class(status),
        status
    )?;
    writeln!(html, "<div><strong>Start Time:</strong> {}</div>", time(&test_case.start_time))?;
    writeln!(html, "<div><strong>End Time:</strong> {}</div>", time(&test_case.end_time))?;
    writeln!(html, "<div><strong>Duration:</strong> {} seconds</div>", duration)?;
    writeln!(html, "</div>\n</div>")?;

    if !test_case.summary.is_empty() {
        writeln!(
            html,
            "<div class=\"page-analysis\">\n<h2>Page Analysis</h2>\n<p>{}</p>\n</div>",
            encode_text(&test_case.summary)
        )?;
    }

    writeln!(html, "<h2>Test Steps</h2>\n<table class=\"steps\">")?;
    writeln!(
        html,
        "<thead><tr><th>#</th><th>Action</th><th>Details</th><th>Expected Result</th><th>Status</th><th>Notes</th></tr></thead>\n<tbody>"
    )?;
    for step in &test_case.steps {
        let row_class = match step.status {
            StepStatus::Pass => "step-pass",
            StepStatus::Fail => "step-fail",
            StepStatus::NotRun => "step-not-run",
        };
        let mut details = String::new();
        if let Some(selector) = &step.element_selector {
            details.push_str(&format!("Selector: {}", encode_text(selector)));
        }
        if let Some(value) = &step.input_value {
            if !details.is_empty() {
                details.push_str("<br>");
            }
            details.push_str(&format!("Value: {}", encode_text(value)));
        }
        writeln!(
            html,
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"status-{}\">{}</td><td>{}</td></tr>",
            row_class,
            step.step_number,
            encode_text(step.action.as_str()),
            details,
            encode_text(step.expected_result.as_deref().unwrap_or("")),
            status_class(step.status.as_str()),
            step.status,
            encode_text(step.notes.as_deref().unwrap_or("")),
        )?;
        if let Some(path) = &step.screenshot_path {
            writeln!(
                html,
                "<tr class=\"{}\"><td colspan=\"6\"><img src=\"{}\" alt=\"Step {} Screenshot\" class=\"screenshot\"></td></tr>",
                row_class,
                encode_double_quoted_attribute(&image_src(path, reports_dir)),
                step.step_number
            )?;
        }
    }
    writeln!(html, "</tbody>\n</table>\n</body>\n</html>")?;

    Ok(html)
}
