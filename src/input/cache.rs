//! Time-bounded cache of encoded reference image payloads

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{AppError, Result};
use crate::response::base64;

struct CacheEntry {
    payload: String,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Maps absolute local paths to data URLs.
///
/// Entries expire after `ttl`; once more than `capacity` live entries exist
/// the oldest-inserted one is evicted.
pub struct PayloadCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl PayloadCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    /// Return the cached data URL for `path`, reading and encoding the file on a miss
    pub async fn get_or_encode(&self, path: &Path) -> Result<String> {
        let key = std::path::absolute(path).map_err(|source| AppError::InputResolution {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(payload) = self.get_live(&key) {
            debug!(path = ?key, "Reference image cache hit");
            return Ok(payload);
        }

        let bytes = tokio::fs::read(&key)
            .await
            .map_err(|source| AppError::InputResolution {
                path: key.clone(),
                source,
            })?;

        let payload = base64::create_data_url(&bytes, &base64::format_for_path(&key));
        debug!(path = ?key, size = bytes.len(), "Encoded reference image");

        self.insert(key, payload.clone());
        Ok(payload)
    }

    fn get_live(&self, key: &Path) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: PathBuf, payload: String) {
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );

        let ttl = self.ttl;
        entries.retain(|_, entry| !entry.is_expired(ttl));

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(path, _)| path.clone());
            match oldest {
                Some(path) => {
                    entries.remove(&path);
                    debug!(path = ?path, "Evicted oldest reference image from cache");
                }
                None => break,
            }
        }
    }

    /// Whether a live entry exists for `path`
    pub fn contains(&self, path: &Path) -> bool {
        let Ok(key) = std::path::absolute(path) else {
            return false;
        };
        self.entries
            .lock()
            .get(&key)
            .map_or(false, |entry| !entry.is_expired(self.ttl))
    }

    /// Number of physically stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PayloadCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
