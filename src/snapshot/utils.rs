use chrono::Local;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::snapshot::types::{ShotKind, Snapshot, SnapshotResult};

/// Generate a timestamp string in YYYYMMDD_HHMMSS format
pub fn generate_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Generate a filename for a step screenshot, e.g. `error_step_3_20250101_120000.png`
pub fn generate_filename(kind: ShotKind, step_number: Option<u32>, timestamp: &str) -> String {
    match step_number {
        Some(n) => format!("{}_{}_{}.png", kind.prefix(), n, timestamp),
        None => format!("{}_{}.png", kind.prefix(), timestamp),
    }
}

/// Pick a path in `dir` that does not exist yet.
///
/// Second-resolution timestamps collide when steps run fast, so a
/// millisecond suffix is appended when the plain name is taken.
pub fn unique_path(dir: &Path, kind: ShotKind, step_number: Option<u32>) -> PathBuf {
    let timestamp = generate_timestamp();
    let candidate = dir.join(generate_filename(kind, step_number, &timestamp));
    if !candidate.exists() {
        return candidate;
    }
    let mut suffix = Local::now().timestamp_subsec_millis();
    loop {
        let name = generate_filename(kind, step_number, &format!("{}_{:03}", timestamp, suffix));
        let path = dir.join(name);
        if !path.exists() {
            return path;
        }
        suffix += 1;
    }
}

/// Read width and height from an encoded image header without decoding pixels
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Create base metadata map for snapshots
pub fn create_base_metadata(
    dimensions: Option<(u32, u32)>,
    kind: ShotKind,
    step_number: Option<u32>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut meta = serde_json::Map::new();
    if let Some((width, height)) = dimensions {
        meta.insert("width".to_string(), serde_json::Value::Number(width.into()));
        meta.insert("height".to_string(), serde_json::Value::Number(height.into()));
    }
    meta.insert("kind".to_string(), serde_json::Value::String(kind.prefix().to_string()));
    if let Some(n) = step_number {
        meta.insert("step_number".to_string(), serde_json::Value::Number(n.into()));
    }
    meta
}

/// Write the JSON manifest next to a snapshot image
pub fn write_manifest(snapshot: &Snapshot) -> SnapshotResult<PathBuf> {
    let manifest_path = snapshot.image_path.with_extension("json");
    let manifest_data = serde_json::to_value(snapshot)?;
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest_data)?)?;
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_filename() {
        assert_eq!(
            generate_filename(ShotKind::Step, Some(2), "20250101_120000"),
            "step_2_20250101_120000.png"
        );
        assert_eq!(
            generate_filename(ShotKind::ErrorStep, Some(0), "ts"),
            "error_step_0_ts.png"
        );
        assert_eq!(generate_filename(ShotKind::Analysis, None, "ts"), "analysis_ts.png");
    }

    #[test]
    fn test_unique_path_avoids_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), ShotKind::Step, Some(1));
        fs::write(&first, b"png").unwrap();
        let second = unique_path(dir.path(), ShotKind::Step, Some(1));
        assert_ne!(first, second);
        assert!(second.starts_with(dir.path()));
    }

    #[test]
    fn test_base_metadata() {
        let meta = create_base_metadata(Some((1280, 720)), ShotKind::Analysis, None);
        assert_eq!(meta["width"], 1280);
        assert_eq!(meta["kind"], "analysis");
        assert!(meta.get("step_number").is_none());

        let meta = create_base_metadata(None, ShotKind::Step, Some(4));
        assert!(meta.get("width").is_none());
        assert_eq!(meta["step_number"], 4);
    }

    #[test]
    fn test_image_dimensions_of_png() {
        let img = image::RgbImage::new(3, 2);
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        assert_eq!(image_dimensions(&bytes), Some((3, 2)));
        assert_eq!(image_dimensions(b"not an image"), None);
    }
}
