//! Run artifact management.
//!
//! Every run gets its own directory under the results base dir:
//! - `screenshots/` for step and analysis captures (with JSON manifests)
//! - `reports/` for rendered HTML reports
//! - `.session.json` with run metadata and `summary.json` with results

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config;
use crate::snapshot::{ScreenshotStore, ShotKind, unique_path};

/// A run's artifact directory
#[derive(Debug)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after the session is dropped
    pub keep: bool,
}

impl Session {
    /// Create a session with a unique ID under the configured results dir
    pub fn new() -> Self {
        let id = generate_session_id();
        let dir = PathBuf::from(config::results_base_dir()).join(&id);
        Self { id, dir, keep: true }
    }

    /// Create a session with a specific name/prefix
    pub fn with_name(name: &str) -> Self {
        let id = format!("{}_{}", sanitize_name(name), generate_timestamp_suffix());
        let dir = PathBuf::from(config::results_base_dir()).join(&id);
        Self { id, dir, keep: true }
    }

    /// Use an explicit directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);
        Self { id, dir, keep: true }
    }

    /// Set whether to keep files after the session ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Create the directory layout and write session metadata
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.screenshots_dir())?;
        fs::create_dir_all(self.reports_dir())?;

        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Local::now().to_rfc3339(),
            "pid": std::process::id(),
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.dir.join("screenshots")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join("reports")
    }

    /// Path for the run's JSON results
    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    /// Fresh screenshot path; never collides with an existing capture
    pub fn screenshot_path(&self, kind: ShotKind, step_number: Option<u32>) -> PathBuf {
        unique_path(&self.screenshots_dir(), kind, step_number)
    }

    /// Screenshot store writing into this session
    pub fn screenshot_store(&self) -> ScreenshotStore {
        ScreenshotStore::new(self.screenshots_dir())
    }

    /// List all PNG files in the session's screenshot dir
    pub fn list_screenshots(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut captures = Vec::new();
        let dir = self.screenshots_dir();
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }

    /// Remove the session directory unless it is kept
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("run_{}_{}", timestamp, pid)
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
