//! User story to step list generation.
//!
//! The model's reply is untrusted text. The first JSON array of objects found
//! in it is used; if there is none, one direct "JSON only" retry is made, and
//! after that a single placeholder navigate step stands in.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::steps::types::RawStep;
use crate::vlm::{self, VlmConfig, VlmError};

/// Errors from step generation
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The model service could not be reached or rejected the request
    #[error("step generation service failed: {0}")]
    Service(#[from] VlmError),

    /// A background task running the request died
    #[error("step generation task failed: {0}")]
    Task(String),
}

/// Source of step lists for user stories
#[async_trait]
pub trait StepGenerator: Send + Sync {
    async fn generate_steps(&self, story: &str) -> Result<Vec<RawStep>, GeneratorError>;
}

/// Text-in/text-out model
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, GeneratorError>;
}

/// [`TextModel`] over the chat-completions endpoint
#[derive(Debug, Clone)]
pub struct VlmTextModel {
    config: VlmConfig,
}

impl VlmTextModel {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TextModel for VlmTextModel {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, GeneratorError> {
        let config = self.config.clone();
        let system = system.map(str::to_string);
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || vlm::complete_text(&config, system.as_deref(), &prompt))
            .await
            .map_err(|e| GeneratorError::Task(e.to_string()))?
            .map_err(GeneratorError::from)
    }
}

/// Instructions describing the step schema
pub const SYSTEM_PROMPT: &str = r##"You are an expert test automation engineer. Your task is to convert user stories into precise browser test steps.

For each user story, generate a JSON array of test steps. Each step should include:
- step_number: The sequence number of the step
- action: One of "navigate", "click", "type", "select", "assert", "wait", "hover", "file_upload", "screenshot"
- element_selector: CSS selector for the element (when applicable); use "text=<literal>" to assert visible text
- input_value: URL for navigate, text for type, option value for select, milliseconds for wait, file path for file_upload
- expected_result: Expected outcome of the step

Do not include code, only the JSON array of steps.
Example format:
[
    {"step_number": 1, "action": "navigate", "element_selector": null, "input_value": "https://example.com", "expected_result": "Page loads successfully"},
    {"step_number": 2, "action": "type", "element_selector": "#username", "input_value": "testuser", "expected_result": "Username is entered"}
]"##;

/// First prompt for a story
pub fn story_prompt(story: &str) -> String {
    format!(
        "User Story: {}\n\nGenerate a detailed sequence of test steps that can be automated in a browser to verify this user story.\nFocus on concrete actions like navigation, clicks, typing, and assertions.",
        story.trim()
    )
}

/// Retry prompt asking for nothing but the JSON array
pub fn direct_prompt(story: &str) -> String {
    format!(
        r#"Convert this user story into a JSON array of test steps:
{}

Return ONLY the JSON array with this format:
[
    {{"step_number": 1, "action": "navigate", "element_selector": null, "input_value": "URL", "expected_result": "outcome"}},
    ...
]"#,
        story.trim()
    )
}

/// Prompt turning a story into a numbered plan of UI actions
pub fn plan_prompt(story: &str) -> String {
    format!(
        r#"You are a QA automation assistant.
Your task is to convert a given user story into a clear sequence of UI actions.

Example:
User Story: "As a user, I want to log in to my account."
Output Plan:
1. Navigate to login page
2. Enter username
3. Enter password
4. Click login button

Now process this:
User Story: {}
Output Plan:
"#,
        story.trim()
    )
}

/// Locate the outermost `[ { ... } ]` span in free text.
///
/// Starts at the first `[` whose next non-space char is `{` and ends at the
/// last `]` preceded (ignoring whitespace) by `}`.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.char_indices().find_map(|(i, c)| {
        (c == '[' && text[i + 1..].trim_start().starts_with('{')).then_some(i)
    })?;
    let end = text.char_indices().rev().find_map(|(i, c)| {
        (c == ']' && i > start && text[..i].trim_end().ends_with('}')).then_some(i)
    })?;
    Some(&text[start..=end])
}

/// Parse a model reply into steps; `None` when no usable array is present
pub fn parse_steps(text: &str) -> Option<Vec<RawStep>> {
    let json = extract_json_array(text)?;
    match serde_json::from_str::<Vec<RawStep>>(json) {
        Ok(steps) if !steps.is_empty() => Some(steps),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "step array did not parse");
            None
        }
    }
}

/// Generator asking a [`TextModel`] for steps
pub struct LlmStepGenerator<M> {
    model: M,
}

impl LlmStepGenerator<VlmTextModel> {
    /// Generator using the configured chat-completions endpoint
    pub fn from_config(config: VlmConfig) -> Self {
        Self::new(VlmTextModel::new(config))
    }
}

impl<M: TextModel> LlmStepGenerator<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Ask for a numbered plan instead of steps
    pub async fn generate_plan(&self, story: &str) -> Result<String, GeneratorError> {
        self.model.complete(None, &plan_prompt(story)).await
    }
}

#[async_trait]
impl<M: TextModel> StepGenerator for LlmStepGenerator<M> {
    async fn generate_steps(&self, story: &str) -> Result<Vec<RawStep>, GeneratorError> {
        // A failure here means the service is unusable; let the caller see it
        let reply = self.model.complete(Some(SYSTEM_PROMPT), &story_prompt(story)).await?;
        if let Some(steps) = parse_steps(&reply) {
            return Ok(steps);
        }

        warn!("no step array in model reply, retrying with direct prompt");
        match self.model.complete(None, &direct_prompt(story)).await {
            Ok(reply) => {
                if let Some(steps) = parse_steps(&reply) {
                    return Ok(steps);
                }
                warn!("direct prompt reply had no step array either");
            }
            Err(e) => warn!(error = %e, "direct prompt failed"),
        }

        warn!("using placeholder step for story");
        Ok(vec![RawStep::fallback()])
    }
}
