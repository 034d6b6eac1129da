use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::info;

use crate::auth::{AccessToken, StoredTokenProvider, TokenProvider};
use crate::bookmarks::{BookmarkAggregator, BookmarkSource};
use crate::config_store::ConfigStore;
use crate::datetime_utils::today_utc;
use crate::storage::{save_snapshot, SnapshotPaths};
use crate::twitter::TwitterClient;

/// Reads the token stored by an earlier authorization
pub async fn stored_token(config_path: &Path) -> Result<AccessToken> {
    let store = ConfigStore::load(config_path)?;
    StoredTokenProvider::from_store(&store).obtain_token().await
}

/// Fetches the user's bookmarks and writes today's snapshot
pub async fn execute(token: AccessToken, output_dir: &Path) -> Result<SnapshotPaths> {
    let client = TwitterClient::new(token).context("Failed to initialize Twitter client")?;
    save_bookmarks(client, output_dir, &today_utc()).await
}

/// Aggregates everything `source` returns before touching the output directory
pub async fn save_bookmarks<S: BookmarkSource>(
    source: S,
    output_dir: &Path,
    date: &NaiveDate,
) -> Result<SnapshotPaths> {
    let snapshot = BookmarkAggregator::new(source).run().await?;
    let paths = save_snapshot(&snapshot, output_dir, date)?;

    info!(
        "Saved {count} bookmarks to {path}",
        count = snapshot.bookmarks.len(),
        path = paths.bookmarks.display()
    );
    Ok(paths)
}
