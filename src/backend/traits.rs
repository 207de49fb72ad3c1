//! Request/result types and the trait implemented by generation backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Upper bound on images per request, matching the API's group limit
pub const MAX_BATCH_COUNT: u32 = 15;

/// Upper bound on reference images per request
pub const MAX_REFERENCE_IMAGES: usize = 14;

/// Requested output size.
///
/// Named aspect ratios resolve to fixed pixel dimensions, resolution presets
/// and literal `WxH` values are passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Resolution2K,
    Resolution4K,
    Pixels { width: u32, height: u32 },
}

const ASPECT_RATIOS: &[(&str, u32, u32)] = &[
    ("1:1", 2048, 2048),
    ("4:3", 2304, 1728),
    ("3:4", 1728, 2304),
    ("16:9", 2560, 1440),
    ("9:16", 1440, 2560),
    ("3:2", 2496, 1664),
    ("2:3", 1664, 2496),
    ("21:9", 3024, 1296),
];

impl ImageSize {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value.to_ascii_uppercase().as_str() {
            "2K" => return Ok(Self::Resolution2K),
            "4K" => return Ok(Self::Resolution4K),
            _ => {}
        }

        if let Some(&(_, width, height)) = ASPECT_RATIOS
            .iter()
            .find(|(ratio, _, _)| *ratio == value)
        {
            return Ok(Self::Pixels { width, height });
        }

        let (width, height) = value
            .split_once(['x', 'X'])
            .and_then(|(w, h)| {
                Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?))
            })
            .ok_or_else(|| {
                AppError::InvalidRequest(format!("Unsupported image size '{}'", value))
            })?;

        if width == 0 || height == 0 {
            return Err(AppError::InvalidRequest(format!(
                "Image dimensions must be positive, got '{}'",
                value
            )));
        }

        Ok(Self::Pixels { width, height })
    }

    /// Value sent in the `size` field of the API request
    pub fn as_api_value(&self) -> String {
        match self {
            Self::Resolution2K => "2K".to_string(),
            Self::Resolution4K => "4K".to_string(),
            Self::Pixels { width, height } => format!("{}x{}", width, height),
        }
    }
}

/// A caller's request to generate images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,

    /// Aspect ratio (`16:9`), preset (`2K`, `4K`) or literal `WxH`
    #[serde(default = "default_size")]
    pub size: String,

    /// Remote URLs, data URLs or local file paths, in order
    #[serde(default)]
    pub reference_images: Vec<String>,

    #[serde(default)]
    pub reference_strength: Option<f32>,

    #[serde(default = "default_batch_count")]
    pub batch_count: u32,

    #[serde(default)]
    pub watermark: bool,
}

fn default_size() -> String {
    "2K".to_string()
}

fn default_batch_count() -> u32 {
    1
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: default_size(),
            reference_images: Vec::new(),
            reference_strength: None,
            batch_count: default_batch_count(),
            watermark: false,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_reference_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.reference_strength = Some(strength);
        self
    }

    pub fn with_batch_count(mut self, count: u32) -> Self {
        self.batch_count = count;
        self
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    /// Check the request against the API's limits
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::InvalidRequest("Prompt cannot be empty".to_string()));
        }

        if self.batch_count == 0 || self.batch_count > MAX_BATCH_COUNT {
            return Err(AppError::InvalidRequest(format!(
                "batch_count must be between 1 and {}, got {}",
                MAX_BATCH_COUNT, self.batch_count
            )));
        }

        if self.reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(AppError::InvalidRequest(format!(
                "At most {} reference images are supported, got {}",
                MAX_REFERENCE_IMAGES,
                self.reference_images.len()
            )));
        }

        if let Some(strength) = self.reference_strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(AppError::InvalidRequest(format!(
                    "reference_strength must be within 0..1, got {}",
                    strength
                )));
            }
        }

        ImageSize::parse(&self.size)?;
        Ok(())
    }
}

/// Reference image(s) as sent to the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImageInput {
    Single(String),
    Multiple(Vec<String>),
}

/// Sequential (group) generation hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequentialMode {
    Auto,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequentialOptions {
    pub max_images: u32,
}

/// JSON body of one streaming generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub response_format: String,
    pub watermark: bool,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    pub sequential_image_generation: SequentialMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequential_image_generation_options: Option<SequentialOptions>,
}

/// One parallel work item: a 1-based index and its own copy of the payload
#[derive(Debug, Clone)]
pub struct GenerationUnit {
    pub index: usize,
    pub payload: ImagePayload,
}

/// An image produced by one unit, optionally persisted locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// 1-based position of the unit that produced this image
    pub index: usize,

    /// Remote location; the API keeps it valid for about 24 hours
    pub url: String,

    pub size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_time_ms: Option<u64>,
}

impl GeneratedImage {
    pub fn new(index: usize, url: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            size: size.into(),
            local_path: None,
            download_time_ms: None,
        }
    }

    /// Approximate token cost, derived from pixel count
    pub fn approximate_tokens(&self) -> Option<u64> {
        match ImageSize::parse(&self.size).ok()? {
            ImageSize::Pixels { width, height } => Some(u64::from(width) * u64::from(height) / 256),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub generated_count: usize,
    pub approximate_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub generation_ms: u64,
    pub download_ms: u64,
    pub total_ms: u64,
}

/// A unit that contributed no image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub index: usize,
    pub message: String,
}

/// Terminal outcome of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub images: Vec<GeneratedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub timing: Timing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<UnitFailure>,
}

impl GenerationResult {
    pub fn failed(message: impl Into<String>, total_ms: u64) -> Self {
        Self {
            success: false,
            images: Vec::new(),
            usage: None,
            timing: Timing {
                total_ms,
                ..Timing::default()
            },
            error: Some(message.into()),
            failures: Vec::new(),
        }
    }
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Model identifier placed in outbound payloads
    fn model(&self) -> &str;

    /// Whether credentials for the remote API are available
    fn has_credentials(&self) -> bool;

    /// Generate exactly one image for a unit
    async fn generate_one(&self, unit: &GenerationUnit) -> Result<GeneratedImage>;
}
