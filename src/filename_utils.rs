use crate::datetime_utils::format_snapshot_date;
use chrono::NaiveDate;
use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};

/// The three documents written for every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Users,
    Media,
    Bookmarks,
}

impl SnapshotKind {
    /// Filename suffix that follows the date prefix
    pub fn suffix(self) -> &'static str {
        match self {
            SnapshotKind::Users => "users_from_bookmarks.json",
            SnapshotKind::Media => "media_from_bookmarks.json",
            SnapshotKind::Bookmarks => "all_bookmarks.json",
        }
    }
}

/// Generate a filename for a snapshot document
/// Format: YYYYMMDD_<suffix>
pub fn snapshot_filename(date: &NaiveDate, kind: SnapshotKind) -> String {
    let prefix = format_snapshot_date(date);
    format!("{prefix}_{suffix}", suffix = kind.suffix())
}

/// Sanitize and create full file path
pub fn sanitized_file_path(output_dir: &Path, filename: &str) -> PathBuf {
    let sanitized_filename = sanitize(filename);
    output_dir.join(sanitized_filename)
}
