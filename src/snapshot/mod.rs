pub mod store;
pub mod types;
pub mod utils;

pub use store::ScreenshotStore;
pub use types::{ShotKind, Snapshot, SnapshotError, SnapshotResult};
pub use utils::{create_base_metadata, generate_filename, generate_timestamp, image_dimensions, unique_path, write_manifest};
