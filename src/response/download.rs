//! Download stage: fetch generated images and persist them locally

use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::{ApiError, AppError, Result};
use crate::response::file::FileHandler;

/// A successfully persisted image
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub local_path: PathBuf,
    pub download_time_ms: u64,
    pub attempts: u32,
}

/// Retrying downloader with its own concurrency cap
pub struct Downloader {
    client: Client,
    permits: Arc<Semaphore>,
    file_prefix: String,
    max_retries: u32,
    base_delay: Duration,
}

impl Downloader {
    pub fn new(config: &DownloadConfig, concurrency: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            file_prefix: config.file_prefix.clone(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    /// Download slots not currently in use
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Delay before the attempt that follows failed attempt `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Fetch `url` into `dir`, retrying up to `max_retries` extra times.
    ///
    /// Waits for a free download slot first. Returns the last error once every
    /// attempt has failed.
    pub async fn download(&self, url: &str, dir: &Path, sequence: usize) -> Result<DownloadedFile> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Internal("Download pool is closed".to_string()))?;

        let files = FileHandler::new(dir, self.file_prefix.as_str());
        let local_path = files.get_path(chrono::Utc::now().timestamp_millis(), sequence);
        let started = Instant::now();
        let total_attempts = self.max_retries + 1;

        let mut attempt = 1;
        loop {
            match self.fetch(url).await {
                Ok(bytes) => {
                    files.save_raw(&local_path, &bytes).await?;
                    let download_time_ms = started.elapsed().as_millis() as u64;
                    info!(
                        sequence,
                        path = ?local_path,
                        attempts = attempt,
                        download_time_ms,
                        "Image downloaded"
                    );
                    return Ok(DownloadedFile {
                        local_path,
                        download_time_ms,
                        attempts: attempt,
                    });
                }
                Err(e) if attempt < total_attempts => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        sequence,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying image download after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(sequence, attempts = attempt, error = %e, "Image download failed");
                    return Err(e);
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "Fetching image");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Api(ApiError::from_reqwest(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Download(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Api(ApiError::from_reqwest(&e)))?;
        Ok(bytes.to_vec())
    }
}
