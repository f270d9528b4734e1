// Core types for persisted page screenshots

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// What a screenshot was taken for; decides the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotKind {
    /// Explicit `screenshot` step or the capture after a step
    Step,
    /// Capture after a step raised an error
    ErrorStep,
    /// Capture for page analysis
    Analysis,
}

impl ShotKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ShotKind::Step => "step",
            ShotKind::ErrorStep => "error_step",
            ShotKind::Analysis => "analysis",
        }
    }
}

/// A screenshot written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Path to the PNG file
    pub image_path: PathBuf,

    pub kind: ShotKind,

    /// Width, height, url, title, step number
    pub metadata: Option<serde_json::Value>,

    /// When the snapshot was written
    pub timestamp: DateTime<Local>,
}

impl Snapshot {
    pub fn new(image_path: PathBuf, kind: ShotKind, metadata: Option<serde_json::Value>) -> Self {
        Self {
            image_path,
            kind,
            metadata,
            timestamp: Local::now(),
        }
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Error types for snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
