//! REST document store client

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{AppError, Result};
use crate::sync::traits::{RecordFields, RecordStatus, RecordStore};

/// Record store speaking a small JSON-over-HTTP document API:
///
/// - `PUT   {base}/collections/{collection}/records/{id}` creates a record
/// - `PATCH {base}/collections/{collection}/records/{id}` updates it
/// - `PUT   {base}/blobs/{filename}` stores bytes and answers `{"url": ..}`
pub struct HttpRecordStore {
    client: Client,
    base_url: Option<String>,
    api_token: Option<String>,
    collection: String,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    url: String,
}

impl HttpRecordStore {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            api_token: config.api_token.clone(),
            collection: config.collection.clone(),
            enabled: config.enabled,
        })
    }

    fn base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| AppError::Sync("sync.base_url is not set".to_string()))
    }

    fn record_url(&self, id: &str) -> Result<String> {
        Ok(format!(
            "{}/collections/{}/records/{}",
            self.base_url()?,
            self.collection,
            id
        ))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(
        response: std::result::Result<Response, reqwest::Error>,
        what: &str,
    ) -> Result<Response> {
        let response = response.map_err(|e| AppError::Sync(format!("{} failed: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Sync(format!("{} returned {}: {}", what, status, body)))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    fn is_configured(&self) -> bool {
        self.enabled && self.base_url.is_some()
    }

    async fn create_record(&self, id: &str, fields: RecordFields) -> Result<()> {
        let url = self.record_url(id)?;
        let response = self
            .authorize(self.client.put(&url))
            .json(&fields.into_map())
            .send()
            .await;
        Self::check(response, "create record").await?;
        debug!(id = %id, "Created record");
        Ok(())
    }

    async fn update_record_status(
        &self,
        id: &str,
        status: RecordStatus,
        patch: RecordFields,
    ) -> Result<()> {
        let url = self.record_url(id)?;
        let body = patch
            .with("status", status)
            .with("updated_at", chrono::Utc::now().to_rfc3339());
        let response = self
            .authorize(self.client.patch(&url))
            .json(&body.into_map())
            .send()
            .await;
        Self::check(response, "update record").await?;
        debug!(id = %id, status = status.as_str(), "Updated record status");
        Ok(())
    }

    async fn upload_blob(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        let url = format!("{}/blobs/{}", self.base_url()?, filename);
        let size = bytes.len();
        let response = self
            .authorize(self.client.put(&url))
            .header(CONTENT_TYPE, "image/jpeg")
            .body(bytes)
            .send()
            .await;
        let response = Self::check(response, "upload blob").await?;
        let blob: BlobResponse = response
            .json()
            .await
            .map_err(|e| AppError::Sync(format!("invalid blob response: {}", e)))?;
        debug!(filename = %filename, size, url = %blob.url, "Uploaded blob");
        Ok(blob.url)
    }
}
