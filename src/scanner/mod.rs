pub mod convention;
pub mod discovery;
pub mod metadata;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::geo::coords::GpsPosition;

pub use discovery::discover_images;
pub use metadata::{read_photo_record, TIMESTAMP_FORMAT};

/// One source image as read from disk. Timestamp and GPS absence are both
/// legal; downstream stages decide what each absence means.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub filename: String,
    pub directory: String,
    pub captured_at: Option<NaiveDateTime>,
    pub position: Option<GpsPosition>,
}

impl PhotoRecord {
    pub fn path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.filename)
    }
}

/// Discover and read every image under `directory`, sorted ascending by
/// capture timestamp. Unreadable images are logged and skipped; the scan
/// continues.
pub fn scan_directory(directory: &Path, extensions: &[String]) -> Result<Vec<PhotoRecord>> {
    let paths = discover_images(directory, extensions)?;
    tracing::info!(count = paths.len(), dir = %directory.display(), "loaded picture paths");

    let mut records = Vec::with_capacity(paths.len());
    for path in &paths {
        match read_photo_record(path) {
            Ok(record) => records.push(record),
            Err(e @ Error::CorruptImage { .. }) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
            }
            Err(e) => return Err(e),
        }
    }

    // Records without a timestamp sort first so the grouper reports them
    // before doing any work.
    records.sort_by_key(|r| r.captured_at);

    Ok(records)
}
