use crate::bookmarks::BookmarkSnapshot;
use crate::error_utils::serialize_to_json_with_context;
use crate::filename_utils::{sanitized_file_path, snapshot_filename, SnapshotKind};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths of the documents written for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub users: PathBuf,
    pub media: PathBuf,
    pub bookmarks: PathBuf,
}

/// Writes the users, media and bookmarks documents for `date` into
/// `output_dir`, overwriting documents from an earlier run on the same date.
pub fn save_snapshot(
    snapshot: &BookmarkSnapshot,
    output_dir: &Path,
    date: &NaiveDate,
) -> Result<SnapshotPaths> {
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).with_context(|| {
            format!(
                "Failed to create output directory {path}",
                path = output_dir.display()
            )
        })?;
        info!(
            "Created output directory: {path}",
            path = output_dir.display()
        );
    }

    let users = save_document(&snapshot.users, output_dir, date, SnapshotKind::Users)?;
    let media = save_document(&snapshot.media, output_dir, date, SnapshotKind::Media)?;
    let bookmarks = save_document(
        &snapshot.bookmarks,
        output_dir,
        date,
        SnapshotKind::Bookmarks,
    )?;

    Ok(SnapshotPaths {
        users,
        media,
        bookmarks,
    })
}

fn save_document<T: Serialize>(
    document: &T,
    output_dir: &Path,
    date: &NaiveDate,
    kind: SnapshotKind,
) -> Result<PathBuf> {
    let filename = snapshot_filename(date, kind);
    let file_path = sanitized_file_path(output_dir, &filename);

    let json = serialize_to_json_with_context(document, kind.suffix())?;
    fs::write(&file_path, json).with_context(|| {
        format!(
            "Failed to write snapshot to {path}",
            path = file_path.display()
        )
    })?;

    info!("Saved {filename}", filename = file_path.display());
    Ok(file_path)
}
