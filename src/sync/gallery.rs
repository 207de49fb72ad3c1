//! Uploads downloaded images and records their metadata

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::traits::{GeneratedImage, GenerationRequest};
use crate::error::{AppError, Result};
use crate::sync::traits::{RecordFields, RecordStatus, RecordStore};

/// Outcome counts of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub failed: usize,
}

/// Mirrors downloaded images into the record store's gallery
#[derive(Clone)]
pub struct GallerySync {
    store: Arc<dyn RecordStore>,
}

impl GallerySync {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Upload every image that has a local file. Failures are logged, never raised.
    pub async fn sync_images(
        &self,
        request: &GenerationRequest,
        images: &[GeneratedImage],
    ) -> SyncReport {
        if !self.store.is_configured() {
            return SyncReport::default();
        }

        let uploads = images.iter().filter_map(|image| {
            image
                .local_path
                .as_deref()
                .map(|path| self.sync_one(request, image, path))
        });

        let mut report = SyncReport::default();
        for (outcome, image) in join_all(uploads)
            .await
            .into_iter()
            .zip(images.iter().filter(|i| i.local_path.is_some()))
        {
            match outcome {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    warn!(index = image.index, error = %e, "Gallery sync failed");
                    report.failed += 1;
                }
            }
        }

        info!(uploaded = report.uploaded, failed = report.failed, "Gallery sync finished");
        report
    }

    async fn sync_one(
        &self,
        request: &GenerationRequest,
        image: &GeneratedImage,
        path: &Path,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AppError::Sync(format!("invalid file name: {}", path.display())))?;

        let public_url = self.store.upload_blob(bytes, filename).await?;

        let fields = RecordFields::new()
            .with("prompt", &request.prompt)
            .with("size", &image.size)
            .with("image_url", &public_url)
            .with("source_url", &image.url)
            .with("local_path", path.to_string_lossy())
            .with("sequence", image.index)
            .with_opt("reference_strength", request.reference_strength)
            .with_opt("download_time_ms", image.download_time_ms)
            .with("status", RecordStatus::Completed)
            .with("created_at", chrono::Utc::now().to_rfc3339());

        self.store
            .create_record(&Uuid::new_v4().to_string(), fields)
            .await
    }
}
