//! Backend module - Generation traits, stream decoding and the HTTP client

pub mod http_backend;
pub mod sse;
pub mod traits;
