//! User story ingestion from a CSV export of the story spreadsheet.

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Header naming the story column (matched case-insensitively)
pub const STORY_COLUMN: &str = "user_story";

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("failed to read stories: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed story file: {0}")]
    Csv(#[from] csv::Error),

    #[error("no 'user_story' column in {0}")]
    MissingColumn(String),
}

/// Read every non-empty `user_story` cell, in row order
pub fn load_user_stories(path: impl AsRef<Path>) -> Result<Vec<String>, StoryError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let stories = read_stories(file, &path.display().to_string())?;
    info!(path = %path.display(), count = stories.len(), "loaded user stories");
    Ok(stories)
}

/// Parse stories from any CSV source; `source` names it in errors
pub fn read_stories<R: std::io::Read>(reader: R, source: &str) -> Result<Vec<String>, StoryError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(STORY_COLUMN))
        .ok_or_else(|| StoryError::MissingColumn(source.to_string()))?;

    let mut stories = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = index + 2;
        match record.get(column).map(str::trim) {
            Some(story) if !story.is_empty() => stories.push(story.to_string()),
            _ => warn!(line, "skipping row without a user story"),
        }
    }
    Ok(stories)
}
