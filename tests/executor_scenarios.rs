//! Step execution against a scripted page

mod common;

use pretty_assertions::assert_eq;
use std::path::Path;
use std::time::Duration;

use common::FakePage;
use story_vision::config::BrowserSettings;
use story_vision::executor::Executor;
use story_vision::snapshot::ScreenshotStore;
use story_vision::steps::{RawStep, StepAction, StepStatus, TestStep};

fn executor(dir: &Path) -> Executor {
    Executor::new(ScreenshotStore::new(dir.join("screenshots")), &BrowserSettings::defaults())
        .with_selector_timeout(Duration::from_millis(10))
}

fn file_name(step: &TestStep) -> String {
    let path = step.screenshot_path.as_deref().expect("screenshot path");
    Path::new(path).file_name().unwrap().to_string_lossy().to_string()
}

#[tokio::test]
async fn test_navigate_passes_and_captures() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(1, StepAction::Navigate).input("https://app.test/login");

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Pass);
    assert_eq!(step.notes.as_deref(), Some("Navigated to https://app.test/login"));
    assert!(file_name(&step).starts_with("step_1_"));
    assert!(Path::new(step.screenshot_path.as_deref().unwrap()).exists());
    assert_eq!(page.actions(), vec!["goto https://app.test/login"]);
}

#[tokio::test]
async fn test_click_on_missing_element_fails_with_error_screenshot() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(2, StepAction::Click).selector("#missing");

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Fail);
    assert_eq!(
        step.notes.as_deref(),
        Some("Error: Timeout after 10ms waiting for '#missing' to be visible")
    );
    assert!(file_name(&step).starts_with("error_step_2_"));
    assert!(page.actions().is_empty());
}

#[tokio::test]
async fn test_type_and_select() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());
    let mut page = FakePage::new().with_visible(&["#username", "#country"]).with_option("nl");

    let typed = exec
        .execute(TestStep::new(1, StepAction::Type).selector("#username").input("alice"), &mut page)
        .await;
    assert_eq!(typed.status, StepStatus::Pass);
    assert_eq!(typed.notes.as_deref(), Some("Typed 'alice' into #username"));

    let selected = exec
        .execute(TestStep::new(2, StepAction::Select).selector("#country").input("nl"), &mut page)
        .await;
    assert_eq!(selected.status, StepStatus::Pass);
    assert_eq!(selected.notes.as_deref(), Some("Selected 'nl' from #country"));

    let bad_option = exec
        .execute(TestStep::new(3, StepAction::Select).selector("#country").input("xx"), &mut page)
        .await;
    assert_eq!(bad_option.status, StepStatus::Fail);
    assert!(bad_option.notes.unwrap().contains("no option with value 'xx'"));

    assert_eq!(page.actions(), vec!["fill #username alice", "select #country nl"]);
}

#[tokio::test]
async fn test_wait_with_non_numeric_input_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(3, StepAction::Wait).input("abc");

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Fail);
    let notes = step.notes.unwrap();
    assert!(notes.starts_with("Error: wait expects a whole number of milliseconds"));
    assert!(notes.contains("'abc'"));
}

#[tokio::test]
async fn test_wait_passes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(1, StepAction::Wait).input("250");

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.notes.as_deref(), Some("Waited for 250ms"));
    assert_eq!(page.actions(), vec!["wait 250"]);
}

#[tokio::test]
async fn test_wait_capped_at_navigation_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(1, StepAction::Wait).input("99999999999");

    let step = executor(tmp.path())
        .with_max_wait(Duration::from_millis(500))
        .execute(step, &mut page)
        .await;

    assert_eq!(step.status, StepStatus::Pass);
    assert_eq!(step.notes.as_deref(), Some("Waited for 500ms (capped from 99999999999ms)"));
    assert_eq!(page.actions(), vec!["wait 500"]);
}

#[tokio::test]
async fn test_unknown_action_fails_without_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::from(RawStep {
        step_number: Some(4),
        action: Some("drag".to_string()),
        ..Default::default()
    });

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Fail);
    assert_eq!(step.notes.as_deref(), Some("Unknown action: drag"));
    assert!(file_name(&step).starts_with("step_4_"));
}

#[tokio::test]
async fn test_missing_selector_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = TestStep::new(1, StepAction::Click);

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Fail);
    assert_eq!(step.notes.as_deref(), Some("Error: click requires element_selector"));
}

#[tokio::test]
async fn test_assert_text_and_element() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());
    let mut page = FakePage::new().with_visible(&["#welcome"]).with_text("Welcome back, alice");

    let text = exec
        .execute(TestStep::new(1, StepAction::Assert).selector("text=Welcome back"), &mut page)
        .await;
    assert_eq!(text.status, StepStatus::Pass);
    assert_eq!(text.notes.as_deref(), Some("Text 'Welcome back' is visible on the page"));

    let absent = exec
        .execute(TestStep::new(2, StepAction::Assert).selector("text=Goodbye"), &mut page)
        .await;
    assert_eq!(absent.status, StepStatus::Fail);
    assert_eq!(absent.notes.as_deref(), Some("Text 'Goodbye' is not visible on the page"));
    // A false check is not an error
    assert!(file_name(&absent).starts_with("step_2_"));

    let element = exec
        .execute(TestStep::new(3, StepAction::Assert).selector("#welcome"), &mut page)
        .await;
    assert_eq!(element.notes.as_deref(), Some("Element #welcome is visible"));
}

#[tokio::test]
async fn test_assert_text_split_across_inline_children() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());
    // Rendered text of <p>Welcome, <b>Ann</b></p>
    let mut page = FakePage::new().with_visible(&["p"]).with_text("Welcome,\n   Ann");

    let loose = exec
        .execute(TestStep::new(1, StepAction::Assert).selector("text=welcome, ann"), &mut page)
        .await;
    assert_eq!(loose.status, StepStatus::Pass);

    let exact = exec
        .execute(TestStep::new(2, StepAction::Assert).selector("text=\"Welcome, Ann\""), &mut page)
        .await;
    assert_eq!(exact.status, StepStatus::Pass);

    let wrong_case = exec
        .execute(TestStep::new(3, StepAction::Assert).selector("text=\"welcome, ann\""), &mut page)
        .await;
    assert_eq!(wrong_case.status, StepStatus::Fail);
    assert_eq!(wrong_case.notes.as_deref(), Some("Text 'welcome, ann' is not visible on the page"));

    let partial_exact = exec
        .execute(TestStep::new(4, StepAction::Assert).selector("text='Welcome'"), &mut page)
        .await;
    assert_eq!(partial_exact.status, StepStatus::Fail);
}

#[tokio::test]
async fn test_re_execution_overwrites_outcome() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());
    let mut page = FakePage::new();
    let step = TestStep::new(1, StepAction::Click).selector("#submit");

    let failed = exec.execute(step, &mut page).await;
    assert_eq!(failed.status, StepStatus::Fail);
    let first_shot = failed.screenshot_path.clone();

    page.visible.insert("#submit".to_string());
    let passed = exec.execute(failed, &mut page).await;

    assert_eq!(passed.status, StepStatus::Pass);
    assert_eq!(passed.notes.as_deref(), Some("Clicked on #submit"));
    assert!(file_name(&passed).starts_with("step_1_"));
    assert_ne!(passed.screenshot_path, first_shot);
}

#[tokio::test]
async fn test_screenshot_failure_does_not_change_outcome() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new().without_screenshots();
    let step = TestStep::new(1, StepAction::Navigate).input("https://app.test");

    let step = executor(tmp.path()).execute(step, &mut page).await;

    assert_eq!(step.status, StepStatus::Pass);
    assert_eq!(step.screenshot_path, None);
}

#[tokio::test]
async fn test_screenshot_action() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());

    let mut page = FakePage::new();
    let step = exec.execute(TestStep::new(5, StepAction::Screenshot), &mut page).await;
    assert_eq!(step.status, StepStatus::Pass);
    let path = step.screenshot_path.clone().unwrap();
    assert_eq!(step.notes, Some(format!("Screenshot saved to {}", path)));

    let mut broken = FakePage::new().without_screenshots();
    let step = exec.execute(TestStep::new(6, StepAction::Screenshot), &mut broken).await;
    assert_eq!(step.status, StepStatus::Fail);
    assert_eq!(step.notes.as_deref(), Some("Error: Screenshot failed: target closed"));
}

#[tokio::test]
async fn test_file_upload() {
    let tmp = tempfile::tempdir().unwrap();
    let exec = executor(tmp.path());
    let upload = tmp.path().join("avatar.png");
    std::fs::write(&upload, b"img").unwrap();
    let upload = upload.display().to_string();
    let mut page = FakePage::new().with_visible(&["input[type=file]"]);

    let step = exec
        .execute(
            TestStep::new(1, StepAction::FileUpload).selector("input[type=file]").input(upload.as_str()),
            &mut page,
        )
        .await;
    assert_eq!(step.status, StepStatus::Pass);
    assert_eq!(step.notes, Some(format!("Uploaded file {} to input[type=file]", upload)));

    let missing = exec
        .execute(
            TestStep::new(2, StepAction::FileUpload).selector("input[type=file]").input("/nope/missing.png"),
            &mut page,
        )
        .await;
    assert_eq!(missing.status, StepStatus::Fail);
    assert!(missing.notes.unwrap().contains("does not exist"));
}

#[tokio::test]
async fn test_hover() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new().with_visible(&["#menu"]);
    let step = executor(tmp.path())
        .execute(TestStep::new(1, StepAction::Hover).selector("#menu"), &mut page)
        .await;
    assert_eq!(step.notes.as_deref(), Some("Hovered over #menu"));
}

#[tokio::test]
async fn test_hover_waits_for_visibility() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new();
    let step = executor(tmp.path())
        .execute(TestStep::new(1, StepAction::Hover).selector("#menu"), &mut page)
        .await;
    assert_eq!(step.status, StepStatus::Fail);
    assert_eq!(
        step.notes.as_deref(),
        Some("Error: Timeout after 10ms waiting for '#menu' to be visible")
    );
    assert!(page.actions().is_empty());
}
