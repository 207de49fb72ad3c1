//! Narrow interface to the external record store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Lifecycle of a job or image record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Record fields that never contain null values.
///
/// Absent optionals are skipped rather than written as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields(Map<String, Value>);

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            if !value.is_null() {
                self.0.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn with_opt<T: Serialize>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Trait for job/image record stores
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether the store can be used at all; callers skip sync when false
    fn is_configured(&self) -> bool;

    /// Idempotently create a record
    async fn create_record(&self, id: &str, fields: RecordFields) -> Result<()>;

    async fn update_record_status(
        &self,
        id: &str,
        status: RecordStatus,
        patch: RecordFields,
    ) -> Result<()>;

    /// Store image bytes and return their public URL
    async fn upload_blob(&self, bytes: Vec<u8>, filename: &str) -> Result<String>;
}

/// Store used when sync is not configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl RecordStore for NoopStore {
    fn is_configured(&self) -> bool {
        false
    }

    async fn create_record(&self, _id: &str, _fields: RecordFields) -> Result<()> {
        Err(AppError::Sync("record store is not configured".to_string()))
    }

    async fn update_record_status(
        &self,
        _id: &str,
        _status: RecordStatus,
        _patch: RecordFields,
    ) -> Result<()> {
        Err(AppError::Sync("record store is not configured".to_string()))
    }

    async fn upload_blob(&self, _bytes: Vec<u8>, _filename: &str) -> Result<String> {
        Err(AppError::Sync("record store is not configured".to_string()))
    }
}
