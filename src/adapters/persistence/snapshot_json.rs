//! JSON fixture files. Loads a StoreSnapshot into any EntityStore and writes one back out.

use crate::domain::{DomainError, StoreSnapshot};
use crate::ports::EntityStore;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// A snapshot file on disk (pretty-printed JSON).
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<StoreSnapshot, DomainError> {
        let raw = fs::read_to_string(&self.path)
            .await
            .map_err(|e| DomainError::Snapshot(format!("read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| DomainError::Snapshot(format!("parse {}: {}", self.path.display(), e)))
    }

    /// Write-replace: temp file, sync_all, then rename over the target, so a
    /// crash mid-write never leaves a truncated fixture.
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), DomainError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| DomainError::Snapshot(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Snapshot(format!("create dir: {}", e)))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&temp_path)
            .await
            .map_err(|e| DomainError::Snapshot(format!("create temp file: {}", e)))?;
        f.write_all(json.as_bytes())
            .await
            .map_err(|e| DomainError::Snapshot(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Snapshot(format!("sync temp file: {}", e)))?;
        drop(f);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| DomainError::Snapshot(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }

    /// Replaces the store's contents with this file.
    pub async fn import_into(&self, store: &dyn EntityStore) -> Result<(), DomainError> {
        let snapshot = self.load().await?;
        let (users, posts) = (snapshot.users.len(), snapshot.posts.len());
        store.restore(snapshot).await?;
        info!(path = %self.path.display(), users, posts, "fixture imported");
        Ok(())
    }

    pub async fn export_from(&self, store: &dyn EntityStore) -> Result<(), DomainError> {
        let snapshot = store.snapshot().await?;
        self.save(&snapshot).await?;
        info!(
            path = %self.path.display(),
            posts = snapshot.posts.len(),
            "snapshot exported"
        );
        Ok(())
    }
}
