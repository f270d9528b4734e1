use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use story_vision::analyzer::{PageAnalyzer, VlmAnalysisService};
use story_vision::browser::{BrowserPage, BrowserSession};
use story_vision::config::{self, BrowserSettings};
use story_vision::report::HtmlReporter;
use story_vision::runner::{Orchestrator, RunSummary};
use story_vision::session::Session;
use story_vision::steps::{LlmStepGenerator, StepGenerator};
use story_vision::stories::load_user_stories;
use story_vision::vlm::{VlmConfig, check_health};

/// Story Vision - browser test automation from user stories
#[derive(Parser, Debug)]
#[command(
    name = "story-vision",
    version,
    about = "Turn user stories into browser test runs with LLM step generation and vision analysis",
    after_help = "ENVIRONMENT VARIABLES:\n\
        STORY_VISION_LLM_ENDPOINT           Chat-completions endpoint URL\n\
        STORY_VISION_LLM_MODEL              Model name\n\
        STORY_VISION_LLM_API_KEY            Bearer token for the endpoint\n\
        STORY_VISION_LLM_TIMEOUT            Streaming inactivity timeout (s)\n\
        STORY_VISION_RESULTS_DIR            Base directory for run artifacts\n\
        STORY_VISION_HEADLESS               Run the browser headless (true/false)\n\
        STORY_VISION_VIEWPORT               Viewport size as WxH\n\
        STORY_VISION_SELECTOR_TIMEOUT_MS    Element visibility timeout\n\
        STORY_VISION_NAVIGATION_TIMEOUT_MS  Page load timeout"
)]
struct Args {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate, execute and report tests for user stories
    Run {
        /// CSV file with a user_story column
        #[arg(long, conflicts_with = "story", required_unless_present = "story")]
        stories: Option<PathBuf>,

        /// Inline user story (repeatable)
        #[arg(long)]
        story: Vec<String>,

        /// Run headless; pass `false` to show the browser window
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        headless: Option<bool>,

        /// Viewport size as WxH (e.g. 1280x720)
        #[arg(long)]
        viewport: Option<String>,

        /// Skip the page analysis after each passing step
        #[arg(long)]
        no_interim_analysis: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Artifact directory (default: new run dir under the results dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the generated steps for a story as JSON
    Generate {
        #[arg(long)]
        story: String,
    },

    /// Print a numbered UI action plan for a story
    Plan {
        #[arg(long)]
        story: String,
    },

    /// Open a URL and print the page analysis
    Analyze {
        #[arg(long)]
        url: String,

        /// Artifact directory for the analysis screenshot
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the LLM endpoint is reachable
    Check,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_session(output: Option<PathBuf>, name: &str) -> Result<Session> {
    let session = match output {
        Some(dir) => Session::in_dir(dir),
        None => Session::with_name(name),
    };
    session
        .init()
        .with_context(|| format!("failed to create run directory {}", session.dir.display()))?;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match args.command {
        Commands::Run {
            stories,
            story,
            headless,
            viewport,
            no_interim_analysis,
            json,
            output,
        } => {
            let stories = match stories {
                Some(path) => load_user_stories(&path)
                    .with_context(|| format!("failed to load stories from {}", path.display()))?,
                None => story,
            };
            if stories.is_empty() {
                bail!("no user stories to run");
            }

            let mut settings = BrowserSettings::default();
            if let Some(headless) = headless {
                settings.headless = headless;
            }
            if let Some(viewport) = viewport {
                let (width, height) = config::parse_viewport(&viewport)
                    .with_context(|| format!("invalid viewport '{}', expected WxH", viewport))?;
                settings.viewport_width = width;
                settings.viewport_height = height;
            }

            let session = open_session(output, "run")?;
            let vlm = VlmConfig::default();
            let orchestrator = Orchestrator::new(
                Arc::new(LlmStepGenerator::from_config(vlm.clone())),
                Arc::new(VlmAnalysisService::new(vlm)),
                Arc::new(HtmlReporter::new(session.reports_dir())),
                session.screenshot_store(),
                settings,
            )
            .interim_analysis(!no_interim_analysis);

            let summary = orchestrator.run_with_browser(&stories).await?;
            summary
                .write_json(&session.summary_path())
                .context("failed to write summary.json")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
                println!("\nResults: {}", session.dir.display());
            }
        }

        Commands::Generate { story } => {
            let generator = LlmStepGenerator::from_config(VlmConfig::default());
            let steps = generator.generate_steps(&story).await?;
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }

        Commands::Plan { story } => {
            let generator = LlmStepGenerator::from_config(VlmConfig::default());
            println!("{}", generator.generate_plan(&story).await?.trim());
        }

        Commands::Analyze { url, output } => {
            let session = open_session(output, "analyze")?;
            let analyzer = PageAnalyzer::new(
                Arc::new(VlmAnalysisService::new(VlmConfig::default())),
                session.screenshot_store(),
            );

            let mut browser = BrowserSession::start(BrowserSettings::default()).await?;
            let analysis = match browser.goto(&url).await {
                Ok(()) => Ok(analyzer.analyze(&mut browser).await),
                Err(e) => Err(e),
            };
            if let Err(e) = browser.close().await {
                warn!(error = %e, "browser teardown failed");
            }
            let analysis = analysis.with_context(|| format!("failed to open {}", url))?;

            println!("{}", analysis.summary);
            if let Some(path) = &analysis.screenshot_path {
                println!("\nScreenshot: {}", path);
            }
        }

        Commands::Check => {
            let cfg = config::get();
            let endpoint = cfg.llm.endpoint.clone();
            let timeout = cfg.llm.connect_timeout;
            let target = endpoint.clone();
            let healthy = tokio::task::spawn_blocking(move || check_health(&target, timeout)).await??;
            if healthy {
                info!(endpoint = %endpoint, "endpoint reachable");
                println!("LLM endpoint responding at {}", endpoint);
            } else {
                bail!("LLM endpoint not responding at {}", endpoint);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let (total, passed, failed, errors) = summary.totals();
    println!("=== Test Automation Summary ===");
    println!("Total test cases: {}", total);
    println!("Passed: {}, Failed: {}, Errors: {}", passed, failed, errors);
    for case in &summary.test_cases {
        println!();
        println!("{} [{}] {}", case.id, case.status, case.user_story);
        for step in case.failed_steps() {
            println!(
                "  step {} ({}): {}",
                step.step_number,
                step.action,
                step.notes.as_deref().unwrap_or("")
            );
        }
        if let Some(report) = case.html_report_path.as_deref().filter(|p| !p.is_empty()) {
            println!("  Report: {}", report);
        }
    }
}
