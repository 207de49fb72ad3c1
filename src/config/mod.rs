//! Configuration module

pub mod settings;

pub use settings::{
    ApiConfig, CacheConfig, DownloadConfig, LoggingConfig, PipelineConfig, Settings, SyncConfig,
};
