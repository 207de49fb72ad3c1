//! Reference image input handling - payload cache and resolver

pub mod cache;
pub mod resolver;

pub use cache::PayloadCache;
pub use resolver::ImageResolver;
