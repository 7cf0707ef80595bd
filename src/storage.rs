//! Favorites persistence: one JSON file holding the set of favorited article
//! URLs.
//!
//! The file is the single source of truth across sessions. Reads are lenient —
//! a missing or corrupt file is an empty set, never an error — while writes
//! are strict and atomic so a crash can never leave a half-written file
//! behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write favorites file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode favorites: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Favorites Store
// ============================================================================

/// Stores the favorites set as a JSON array of URL strings.
///
/// Saves go through a write-to-temp-then-rename sequence: the temp file gets
/// a randomized suffix (so a concurrent writer cannot collide on the path),
/// is synced to disk, then renamed over the destination. Rename is atomic on
/// the same filesystem, so readers observe either the old set or the new one.
pub struct FavoritesStore {
    path: PathBuf,
}

impl FavoritesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted favorites set.
    ///
    /// Missing file, unreadable file, or unparseable contents all yield an
    /// empty set. Favorites are a convenience, not critical data; losing them
    /// must never stop the feed from loading.
    pub async fn load(&self) -> HashSet<String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No favorites file, starting empty");
                return HashSet::new();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to read favorites file, starting empty");
                return HashSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(urls) => {
                let favorites: HashSet<String> = urls.into_iter().collect();
                tracing::debug!(count = favorites.len(), "Loaded favorites");
                favorites
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Corrupt favorites file, starting empty");
                HashSet::new()
            }
        }
    }

    /// Persist the whole favorites set, replacing any previous contents.
    ///
    /// URLs are written sorted so the on-disk representation is stable across
    /// saves of the same set.
    pub async fn save(&self, favorites: &HashSet<String>) -> Result<(), StorageError> {
        let mut urls: Vec<&String> = favorites.iter().collect();
        urls.sort();
        let encoded = serde_json::to_vec_pretty(&urls)?;

        // Randomized temp filename: an unpredictable path cannot be
        // pre-created by another process between check and open.
        use std::time::{SystemTime, UNIX_EPOCH};
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!("tmp.{:016x}", random_suffix));

        let mut temp_file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true) // Fails if the path exists (prevents symlink race)
            .open(&temp_path)
            .await?;

        if let Err(err) = self.write_and_sync(&mut temp_file, &encoded).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        drop(temp_file);

        if let Err(err) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        tracing::debug!(count = favorites.len(), path = %self.path.display(), "Favorites saved");
        Ok(())
    }

    async fn write_and_sync(
        &self,
        file: &mut tokio::fs::File,
        contents: &[u8],
    ) -> std::io::Result<()> {
        file.write_all(contents).await?;
        // Sync before rename so the rename never publishes an empty file
        file.sync_all().await
    }
}

// ============================================================================
// Tests
// ============================================================================
