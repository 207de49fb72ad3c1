//! File storage handler for downloaded images

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, Result};

/// Writes images into one directory under `<prefix>_<timestamp>_<sequence>.jpg` names
pub struct FileHandler {
    storage_path: PathBuf,
    prefix: String,
}

impl FileHandler {
    /// Create a new file handler
    pub fn new(storage_path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            prefix: prefix.into(),
        }
    }

    /// Ensure the storage directory exists
    pub async fn ensure_storage_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.storage_path).await.unwrap_or(false) {
            fs::create_dir_all(&self.storage_path)
                .await
                .map_err(AppError::Io)?;
            debug!(path = ?self.storage_path, "Created storage directory");
        }
        Ok(())
    }

    /// Deterministic file name for a timestamp and sequence index
    pub fn file_name(&self, timestamp_ms: i64, sequence: usize) -> String {
        format!("{}_{}_{}.jpg", self.prefix, timestamp_ms, sequence)
    }

    /// Get the full path for a timestamp and sequence index
    pub fn get_path(&self, timestamp_ms: i64, sequence: usize) -> PathBuf {
        self.storage_path.join(self.file_name(timestamp_ms, sequence))
    }

    /// Save raw image data to a path inside the storage directory
    pub async fn save_raw(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.ensure_storage_dir().await?;

        fs::write(path, data).await.map_err(AppError::Io)?;

        debug!(path = ?path, size = data.len(), "Saved image file");
        Ok(())
    }
}
