use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Browser action a step performs.
///
/// Action names coming from the generator are untrusted; anything outside the
/// known set is kept verbatim in `Unknown` so it can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepAction {
    Navigate,
    Click,
    Type,
    Select,
    Assert,
    Wait,
    Hover,
    FileUpload,
    Screenshot,
    Unknown(String),
}

impl StepAction {
    /// All actions the executor can perform
    pub const KNOWN: [StepAction; 9] = [
        StepAction::Navigate,
        StepAction::Click,
        StepAction::Type,
        StepAction::Select,
        StepAction::Assert,
        StepAction::Wait,
        StepAction::Hover,
        StepAction::FileUpload,
        StepAction::Screenshot,
    ];

    /// Parse an action name (case-insensitive, surrounding whitespace ignored)
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "navigate" => StepAction::Navigate,
            "click" => StepAction::Click,
            "type" => StepAction::Type,
            "select" => StepAction::Select,
            "assert" => StepAction::Assert,
            "wait" => StepAction::Wait,
            "hover" => StepAction::Hover,
            "file_upload" => StepAction::FileUpload,
            "screenshot" => StepAction::Screenshot,
            _ => StepAction::Unknown(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepAction::Navigate => "navigate",
            StepAction::Click => "click",
            StepAction::Type => "type",
            StepAction::Select => "select",
            StepAction::Assert => "assert",
            StepAction::Wait => "wait",
            StepAction::Hover => "hover",
            StepAction::FileUpload => "file_upload",
            StepAction::Screenshot => "screenshot",
            StepAction::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, StepAction::Unknown(_))
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StepAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StepAction::parse(&raw))
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepStatus {
    #[default]
    #[serde(rename = "Not Run")]
    NotRun,
    Pass,
    Fail,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotRun => "Not Run",
            StepStatus::Pass => "Pass",
            StepStatus::Fail => "Fail",
        }
    }

    /// Pass and Fail are terminal; NotRun means no attempt was recorded
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::NotRun)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a whole test case.
///
/// `Error` is reserved for orchestration failures; a failed check is `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    #[serde(rename = "Not Run")]
    NotRun,
    Running,
    Pass,
    Fail,
    Error,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::NotRun => "Not Run",
            CaseStatus::Running => "Running",
            CaseStatus::Pass => "Pass",
            CaseStatus::Fail => "Fail",
            CaseStatus::Error => "Error",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step object as produced by the external generator.
///
/// Every field is optional and leniently typed: generators emit `null`,
/// numbers where strings are expected and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub step_number: Option<u32>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub action: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub element_selector: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub input_value: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_result: Option<String>,
}

impl RawStep {
    /// The step used when the generator output cannot be parsed at all
    pub fn fallback() -> Self {
        Self {
            step_number: Some(1),
            action: Some("navigate".to_string()),
            element_selector: None,
            input_value: Some("https://example.com".to_string()),
            expected_result: Some("Error in test step generation".to_string()),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// One atomic browser action and its recorded outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStep {
    /// Position within the case (0 when the generator omitted it)
    pub step_number: u32,

    pub action: StepAction,

    /// Locator for the target element
    pub element_selector: Option<String>,

    /// URL, text, delay in milliseconds, option value or file path depending on the action
    pub input_value: Option<String>,

    /// Informational only; not checked by the executor
    pub expected_result: Option<String>,

    /// Screenshot persisted for this step
    pub screenshot_path: Option<String>,

    pub status: StepStatus,

    /// Human-readable outcome
    pub notes: Option<String>,
}

impl TestStep {
    pub fn new(step_number: u32, action: StepAction) -> Self {
        Self {
            step_number,
            action,
            element_selector: None,
            input_value: None,
            expected_result: None,
            screenshot_path: None,
            status: StepStatus::NotRun,
            notes: None,
        }
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.element_selector = Some(selector.into());
        self
    }

    pub fn input(mut self, value: impl Into<String>) -> Self {
        self.input_value = Some(value.into());
        self
    }

    pub fn expect(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = Some(expected.into());
        self
    }

    /// Clear any previous outcome so a re-run overwrites rather than accumulates
    pub fn reset_outcome(&mut self) {
        self.status = StepStatus::NotRun;
        self.notes = None;
        self.screenshot_path = None;
    }

    pub(crate) fn pass(&mut self, notes: impl Into<String>) {
        self.status = StepStatus::Pass;
        self.notes = Some(notes.into());
    }

    pub(crate) fn fail(&mut self, notes: impl Into<String>) {
        self.status = StepStatus::Fail;
        self.notes = Some(notes.into());
    }
}

impl From<RawStep> for TestStep {
    fn from(raw: RawStep) -> Self {
        Self {
            step_number: raw.step_number.unwrap_or(0),
            action: StepAction::parse(raw.action.as_deref().unwrap_or("")),
            element_selector: raw.element_selector,
            input_value: raw.input_value,
            expected_result: raw.expected_result,
            screenshot_path: None,
            status: StepStatus::NotRun,
            notes: None,
        }
    }
}

/// A user story and the steps generated for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique within a run (e.g. "TC_1")
    pub id: String,

    pub user_story: String,

    /// Execution order
    pub steps: Vec<TestStep>,

    /// Final page analysis, or the error text when the case errored
    pub summary: String,

    pub status: CaseStatus,

    pub start_time: Option<DateTime<Local>>,

    pub end_time: Option<DateTime<Local>>,

    pub duration_seconds: Option<f64>,

    /// Rendered report; empty when the reporter failed
    pub html_report_path: Option<String>,
}

impl TestCase {
    /// Create a case and stamp its start time
    pub fn new(id: impl Into<String>, user_story: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_story: user_story.into(),
            steps: Vec::new(),
            summary: String::new(),
            status: CaseStatus::NotRun,
            start_time: Some(Local::now()),
            end_time: None,
            duration_seconds: None,
            html_report_path: None,
        }
    }

    /// Stamp the end time and derive the duration from the two timestamps
    pub fn finish(&mut self) {
        let end = Local::now();
        let start = *self.start_time.get_or_insert(end);
        self.end_time = Some(end);
        self.duration_seconds = Some(duration_between(start, end));
    }

    /// True when there is at least one step and every step passed
    pub fn all_passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Pass)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &TestStep> {
        self.steps.iter().filter(|s| s.status == StepStatus::Fail)
    }
}

/// Seconds between two timestamps, clamped at zero
pub fn duration_between(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    let elapsed = end - start;
    let seconds = match elapsed.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1_000_000_000.0,
        // Beyond ~292 years nanoseconds overflow i64
        None => elapsed.num_seconds() as f64,
    };
    seconds.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_parse_is_case_insensitive() {
        assert_eq!(StepAction::parse("NAVIGATE"), StepAction::Navigate);
        assert_eq!(StepAction::parse(" File_Upload "), StepAction::FileUpload);
        assert_eq!(
            StepAction::parse("drag"),
            StepAction::Unknown("drag".to_string())
        );
    }

    #[test]
    fn test_known_actions_round_trip_names() {
        for action in StepAction::KNOWN.iter() {
            assert_eq!(&StepAction::parse(action.as_str()), action);
            assert!(action.is_known());
        }
    }

    #[test]
    fn test_raw_step_tolerates_loose_types() {
        let raw: RawStep = serde_json::from_str(
            r##"{"step_number": "3", "action": "wait", "element_selector": null, "input_value": 500}"##,
        )
        .unwrap();
        let step = TestStep::from(raw);
        assert_eq!(step.step_number, 3);
        assert_eq!(step.action, StepAction::Wait);
        assert_eq!(step.element_selector, None);
        assert_eq!(step.input_value.as_deref(), Some("500"));
        assert_eq!(step.status, StepStatus::NotRun);
    }

    #[test]
    fn test_raw_step_defaults_when_fields_missing() {
        let raw: RawStep = serde_json::from_str("{}").unwrap();
        let step = TestStep::from(raw);
        assert_eq!(step.step_number, 0);
        assert_eq!(step.action, StepAction::Unknown(String::new()));
        assert!(step.input_value.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&StepStatus::NotRun).unwrap(), "\"Not Run\"");
        assert_eq!(serde_json::to_string(&CaseStatus::Error).unwrap(), "\"Error\"");
    }

    #[test]
    fn test_reset_outcome_clears_previous_attempt() {
        let mut step = TestStep::new(1, StepAction::Click).selector("#go");
        step.fail("Error: timeout");
        step.screenshot_path = Some("shot.png".to_string());
        step.reset_outcome();
        assert_eq!(step.status, StepStatus::NotRun);
        assert!(step.notes.is_none());
        assert!(step.screenshot_path.is_none());
    }

    #[test]
    fn test_finish_computes_duration_from_timestamps() {
        let mut case = TestCase::new("TC_1", "story");
        let start = Local::now() - chrono::Duration::milliseconds(1500);
        case.start_time = Some(start);
        case.finish();
        let end = case.end_time.unwrap();
        assert_eq!(case.duration_seconds, Some(duration_between(start, end)));
        assert!(case.duration_seconds.unwrap() >= 1.5);
    }

    #[test]
    fn test_duration_matches_serialized_timestamps() {
        let parse = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Local);
        let mut case = TestCase::new("TC_1", "story");
        let start = parse("2025-01-01T00:00:00.123456789Z");
        let end = parse("2025-01-01T00:00:00.123457788Z");
        case.start_time = Some(start);
        case.end_time = Some(end);
        case.duration_seconds = Some(duration_between(start, end));

        let json = serde_json::to_value(&case).unwrap();
        let start = parse(json["start_time"].as_str().unwrap());
        let end = parse(json["end_time"].as_str().unwrap());
        let expected = (end - start).num_nanoseconds().unwrap() as f64 / 1e9;

        assert!(expected > 0.0);
        assert_eq!(json["duration_seconds"].as_f64(), Some(expected));
    }

    #[test]
    fn test_duration_clamped_at_zero() {
        let now = Local::now();
        assert_eq!(duration_between(now, now - chrono::Duration::seconds(1)), 0.0);
    }

    #[test]
    fn test_all_passed_requires_steps() {
        let mut case = TestCase::new("TC_1", "story");
        assert!(!case.all_passed());
        let mut step = TestStep::new(1, StepAction::Navigate);
        step.pass("ok");
        case.steps.push(step);
        assert!(case.all_passed());
        case.steps[0].fail("nope");
        assert!(!case.all_passed());
        assert_eq!(case.failed_steps().count(), 1);
    }
}
