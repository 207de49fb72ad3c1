//! Turns user-supplied image references into values the API accepts

use futures::future::try_join_all;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::input::cache::PayloadCache;
use crate::response::base64;

const REMOTE_PREFIXES: &[&str] = &["http://", "https://"];

/// Resolves remote URLs, data URLs and local paths
#[derive(Clone)]
pub struct ImageResolver {
    cache: Arc<PayloadCache>,
}

impl ImageResolver {
    pub fn new(cache: Arc<PayloadCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<PayloadCache> {
        &self.cache
    }

    /// Whether a reference can be sent as-is
    pub fn is_passthrough(reference: &str) -> bool {
        base64::is_data_url(reference) || REMOTE_PREFIXES.iter().any(|p| reference.starts_with(p))
    }

    /// Resolve a single reference
    pub async fn resolve(&self, reference: &str) -> Result<String> {
        if Self::is_passthrough(reference) {
            return Ok(reference.to_string());
        }
        self.cache.get_or_encode(Path::new(reference)).await
    }

    /// Resolve every reference concurrently, failing if any one fails
    pub async fn resolve_all(&self, references: &[String]) -> Result<Vec<String>> {
        try_join_all(references.iter().map(|r| self.resolve(r))).await
    }
}
