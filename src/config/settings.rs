//! Pipeline settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "ARK_API_KEY";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote generation API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Bound on one whole streaming generation call
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_model() -> String {
    "doubao-seedream-4-0-250828".to_string()
}

fn default_api_timeout() -> u64 {
    180
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_api_timeout(),
        }
    }
}

/// Concurrency and batching limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_generation_concurrency")]
    pub generation_concurrency: usize,
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "default_max_batch_count")]
    pub max_batch_count: u32,
    #[serde(default = "default_max_reference_images")]
    pub max_reference_images: usize,
}

fn default_generation_concurrency() -> usize {
    2
}

fn default_download_concurrency() -> usize {
    4
}

fn default_max_batch_count() -> u32 {
    15
}

fn default_max_reference_images() -> usize {
    14
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_concurrency: default_generation_concurrency(),
            download_concurrency: default_download_concurrency(),
            max_batch_count: default_max_batch_count(),
            max_reference_images: default_max_reference_images(),
        }
    }
}

/// Download stage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_download_dir")]
    pub directory: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Per-attempt timeout
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
    /// Attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> String {
    "./generated_images".to_string()
}

fn default_file_prefix() -> String {
    "seedream".to_string()
}

fn default_download_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay() -> u64 {
    1000
}

impl DownloadConfig {
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_download_dir(),
            file_prefix: default_file_prefix(),
            timeout_secs: default_download_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
        }
    }
}

/// Reference image payload cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_capacity() -> usize {
    10
}

fn default_cache_ttl() -> u64 {
    300
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// External record store / gallery sync configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "generated_images".to_string()
}

fn default_sync_timeout() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            api_token: None,
            collection: default_collection(),
            timeout_secs: default_sync_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Configuration path is not valid UTF-8".to_string(),
            ))
        })?;

        let config = Config::builder()
            .set_default("pipeline.generation_concurrency", 2)?
            .set_default("pipeline.download_concurrency", 4)?
            .set_default("download.enabled", true)?
            .set_default("sync.enabled", false)?
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (GEN_PIPELINE__SECTION__KEY)
            .add_source(
                Environment::with_prefix("GEN_PIPELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_env_credentials();
        Ok(settings)
    }

    /// Fill the API key from `ARK_API_KEY` when the layered config has none
    pub fn apply_env_credentials(&mut self) {
        if self.api.api_key.as_deref().map_or(true, str::is_empty) {
            self.api.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.generation_concurrency == 0 || self.pipeline.download_concurrency == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Concurrency limits must be at least 1".to_string(),
            )));
        }

        if self.pipeline.max_batch_count == 0 || self.pipeline.max_batch_count > 15 {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "max_batch_count must be between 1 and 15, got {}",
                self.pipeline.max_batch_count
            ))));
        }

        if self.pipeline.max_reference_images == 0 || self.pipeline.max_reference_images > 14 {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "max_reference_images must be between 1 and 14, got {}",
                self.pipeline.max_reference_images
            ))));
        }

        if self.cache.capacity == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Cache capacity must be at least 1".to_string(),
            )));
        }

        if self.sync.enabled && self.sync.base_url.is_none() {
            return Err(AppError::Config(config::ConfigError::Message(
                "sync.enabled requires sync.base_url".to_string(),
            )));
        }

        Ok(())
    }
}
