//! Response handling module - Data URLs, file storage and image downloads

pub mod base64;
pub mod download;
pub mod file;

pub use download::{DownloadedFile, Downloader};
