//! Streaming HTTP client for the remote generation API

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::sse::{SseDecoder, StreamEvent};
use crate::backend::traits::{GeneratedImage, GenerationUnit, ImageBackend};
use crate::config::ApiConfig;
use crate::error::{ApiError, AppError, Result};

/// Backend that requests one image per call over a server-sent event stream
pub struct HttpBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpBackend {
    /// Create a new HTTP backend from configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout: config.timeout(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    async fn consume_stream(&self, unit: &GenerationUnit, api_key: &str) -> Result<GeneratedImage> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&unit.payload)
            .send()
            .await
            .map_err(|e| AppError::Api(ApiError::from_reqwest(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api(ApiError::from_response(status.as_u16(), body)));
        }

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::Api(ApiError::from_reqwest(&e)))?;
            for event in decoder.push(&chunk) {
                if let Some(outcome) = self.handle_event(unit.index, event) {
                    return outcome;
                }
            }
        }

        for event in decoder.finish() {
            if let Some(outcome) = self.handle_event(unit.index, event) {
                return outcome;
            }
        }

        Err(AppError::GenerationFailed(
            "stream ended without an image".to_string(),
        ))
    }

    /// Terminal events yield an outcome; everything else keeps the stream going
    fn handle_event(&self, index: usize, event: StreamEvent) -> Option<Result<GeneratedImage>> {
        match event {
            StreamEvent::ImageSucceeded { url, size } => {
                debug!(index, url = %url, size = %size, "Image ready");
                Some(Ok(GeneratedImage::new(index, url, size)))
            }
            StreamEvent::ImageFailed { error } => {
                let message = error.unwrap_or_default().describe();
                warn!(index, error = %message, "Image generation failed");
                Some(Err(AppError::GenerationFailed(message)))
            }
            StreamEvent::Other => None,
        }
    }
}

#[async_trait]
impl ImageBackend for HttpBackend {
    fn name(&self) -> &str {
        "ark-http"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_one(&self, unit: &GenerationUnit) -> Result<GeneratedImage> {
        let api_key = self.api_key.as_deref().ok_or(AppError::MissingCredentials)?;

        debug!(backend = %self.name(), index = unit.index, "Opening generation stream");
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, self.consume_stream(unit, api_key)).await {
            Ok(result) => {
                debug!(
                    index = unit.index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Generation stream finished"
                );
                result
            }
            Err(_) => Err(AppError::Api(ApiError::timeout(format!(
                "image {} was not generated within {}s",
                unit.index,
                self.timeout.as_secs()
            )))),
        }
    }
}
