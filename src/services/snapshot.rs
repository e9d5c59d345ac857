use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{CatalogError, Result};
use crate::models::{Catalog, Channel};

/// JSON snapshot of the whole catalog
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, `Ok(None)` when there is none yet
    pub async fn try_load(&self) -> Result<Option<Catalog>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CatalogError::Persistence(e.to_string())),
        };

        let mut catalog: Catalog = serde_json::from_slice(&bytes)?;
        catalog.channels.iter_mut().for_each(Channel::restore_invariants);
        catalog.rebuild_groups();
        Ok(Some(catalog))
    }

    /// Read the snapshot; a missing or corrupt file yields an empty catalog
    pub async fn load(&self) -> Catalog {
        match self.try_load().await {
            Ok(Some(catalog)) => {
                tracing::info!(
                    "Snapshot loaded from {}: {} channels",
                    self.path.display(),
                    catalog.len()
                );
                catalog
            }
            Ok(None) => Catalog::new(),
            Err(e) => {
                tracing::warn!("Ignoring snapshot {}: {}", self.path.display(), e);
                Catalog::new()
            }
        }
    }

    /// Write the snapshot, falling back to a timestamped backup file.
    ///
    /// Returns the path actually written.
    pub async fn save(&self, catalog: &Catalog) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(catalog)?;

        match write_atomic(&self.path, &json).await {
            Ok(()) => {
                tracing::debug!("Snapshot saved to {}", self.path.display());
                Ok(self.path.clone())
            }
            Err(e) => {
                let backup = self.backup_path();
                tracing::warn!(
                    "Failed to save snapshot to {} ({}), writing backup {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                fs::write(&backup, &json)
                    .await
                    .map_err(|backup_err| {
                        CatalogError::Persistence(format!(
                            "snapshot: {}; backup: {}",
                            e, backup_err
                        ))
                    })?;
                Ok(backup)
            }
        }
    }

    /// `backup_YYYYmmdd_HHMMSS_<name>` next to the snapshot
    fn backup_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "last_playlist.json".to_string());
        let backup_name = format!("backup_{}_{}", Local::now().format("%Y%m%d_%H%M%S"), file_name);

        match self.path.parent() {
            Some(parent) => parent.join(backup_name),
            None => PathBuf::from(backup_name),
        }
    }
}

/// Write to a temp file then rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes).await?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
