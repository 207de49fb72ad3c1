//! Queue module - Generation scheduling and background jobs

pub mod jobs;
pub mod pipeline;

pub use jobs::{JobHandle, JobRunner, JobState};
pub use pipeline::{GenerationPipeline, ProgressCallback, ProgressEvent, RunOptions};
