pub mod generator;
pub mod types;

pub use generator::{
    GeneratorError, LlmStepGenerator, StepGenerator, TextModel, VlmTextModel, extract_json_array, parse_steps,
    plan_prompt,
};
pub use types::{CaseStatus, RawStep, StepAction, StepStatus, TestCase, TestStep, duration_between};
