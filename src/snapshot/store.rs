//! Screenshot persistence for a run.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::snapshot::types::{ShotKind, Snapshot, SnapshotResult};
use crate::snapshot::utils::{create_base_metadata, image_dimensions, unique_path, write_manifest};

/// Writes screenshots and their manifests into one directory
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write PNG bytes plus a JSON manifest and return the snapshot record.
    ///
    /// `extra` is merged into the manifest metadata (url, title, ...).
    pub fn persist(
        &self,
        png: &[u8],
        kind: ShotKind,
        step_number: Option<u32>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> SnapshotResult<Snapshot> {
        fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, kind, step_number);
        fs::write(&path, png)?;

        let mut metadata = create_base_metadata(image_dimensions(png), kind, step_number);
        metadata.extend(extra);

        let snapshot = Snapshot::new(path, kind, Some(serde_json::Value::Object(metadata)));
        write_manifest(&snapshot)?;
        debug!(path = %snapshot.image_path.display(), "screenshot saved");
        Ok(snapshot)
    }
}
