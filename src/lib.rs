//! Image Generation Pipeline
//!
//! Turns a single "generate N images" request into bounded-concurrency
//! streaming generation calls, pipelined downloads and optional gallery sync,
//! returning results in request order.

pub mod backend;
pub mod config;
pub mod error;
pub mod input;
pub mod queue;
pub mod response;
pub mod sync;

pub use backend::traits::{
    GeneratedImage, GenerationRequest, GenerationResult, GenerationUnit, ImageBackend,
};
pub use error::{classify, AppError, Result};
pub use queue::{GenerationPipeline, JobRunner, ProgressEvent, RunOptions};
