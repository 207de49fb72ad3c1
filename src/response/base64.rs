//! Base64 and data URL utilities

use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Check whether a reference is already an encoded data URL
pub fn is_data_url(value: &str) -> bool {
    value.starts_with("data:")
}

/// MIME subtype for an image file, derived from its extension
pub fn format_for_path(path: &Path) -> String {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" => "jpeg".to_string(),
        Some(ext) if !ext.is_empty() => ext,
        _ => "png".to_string(),
    }
}

/// Create a data URL from binary image data
pub fn create_data_url(data: &[u8], format: &str) -> String {
    format!("data:image/{};base64,{}", format, encode(data))
}
