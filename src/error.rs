//! Common error types for the image generation pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API credentials are not configured")]
    MissingCredentials,

    #[error("Failed to read reference image {path}: {source}")]
    InputResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminated failure category of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    RateLimited,
    Server,
    Timeout,
    Network,
    Unknown,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

/// Failure reported by the remote generation API or the transport under it
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Raw response body, when the server sent one
    pub body: Option<String>,
}

/// Error envelope returned by the API: `{"error": {"message": ..}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ApiError {
    /// Build from a non-success HTTP response body
    pub fn from_response(status: u16, body: String) -> Self {
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => match (envelope.error.message, envelope.error.code) {
                (Some(message), _) => message,
                (None, Some(code)) => code,
                (None, None) => format!("HTTP {}", status),
            },
            Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
            Err(_) => body.trim().to_string(),
        };

        Self {
            kind: ApiErrorKind::from_status(status),
            status: Some(status),
            message,
            body: Some(body),
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else if err.is_connect() {
            ApiErrorKind::Network
        } else if let Some(status) = status {
            ApiErrorKind::from_status(status)
        } else {
            ApiErrorKind::Unknown
        };

        Self {
            kind,
            status,
            message: err.to_string(),
            body: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Timeout,
            status: None,
            message: message.into(),
            body: None,
        }
    }
}

/// Map a failure into an actionable, human-readable message.
///
/// The HTTP status wins when present; transport conditions are consulted next.
pub fn classify(error: &AppError) -> String {
    match error {
        AppError::Api(api) => classify_api(api),
        AppError::MissingCredentials => {
            "API key is not configured. Set ARK_API_KEY or api.api_key in the configuration."
                .to_string()
        }
        AppError::InputResolution { path, source } => format!(
            "Could not read reference image '{}': {}. Check that the file exists and is readable.",
            path.display(),
            source
        ),
        AppError::InvalidRequest(message) => format!("Invalid request: {}", message),
        AppError::GenerationFailed(message) => format!(
            "The service could not generate this image: {}. The prompt or reference images may have been rejected by the content filter.",
            message
        ),
        AppError::Config(_)
        | AppError::Io(_)
        | AppError::Download(_)
        | AppError::Sync(_)
        | AppError::Internal(_) => format!("Unexpected error: {}", error),
    }
}

fn classify_api(error: &ApiError) -> String {
    if let Some(status) = error.status {
        return match status {
            400 => format!(
                "Bad request: {}. Check the prompt, size and reference image parameters.",
                error.message
            ),
            401 => format!(
                "Authentication failed: {}. Check that the API key is valid.",
                error.message
            ),
            403 => format!(
                "Permission denied: {}. The API key may lack access to this model.",
                error.message
            ),
            429 => format!(
                "Rate limit exceeded: {}. Reduce concurrency or wait before retrying.",
                error.message
            ),
            500 => format!(
                "Server error: {}. The service failed or the content filter rejected the request; try again or adjust the prompt.",
                error.message
            ),
            other => format!("API error (HTTP {}): {}", other, error.message),
        };
    }

    match error.kind {
        ApiErrorKind::Timeout => timeout_guidance(&error.message),
        ApiErrorKind::Network => format!(
            "Network error: {}. Check connectivity and the configured API base URL.",
            error.message
        ),
        ApiErrorKind::BadRequest
        | ApiErrorKind::Unauthorized
        | ApiErrorKind::Forbidden
        | ApiErrorKind::RateLimited
        | ApiErrorKind::Server
        | ApiErrorKind::Unknown => format!("Unexpected error: {}", error.message),
    }
}

fn timeout_guidance(message: &str) -> String {
    format!(
        "Request timed out: {}. Large sizes or many reference images take longer; retry or raise the timeout.",
        message
    )
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
