//! Background generation jobs backed by durable records

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::traits::{GenerationRequest, GenerationResult};
use crate::error::{AppError, Result};
use crate::queue::pipeline::{GenerationPipeline, RunOptions};
use crate::sync::{RecordFields, RecordStatus, RecordStore};

/// In-process view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
}

/// A submitted job
pub struct JobHandle {
    pub id: String,
    pub task: JoinHandle<()>,
}

/// Runs generation requests after the caller has been answered.
///
/// A `pending` record is written and acknowledged by the store before any
/// work is handed to the runtime, so a job that dies with the process still
/// has a durable trace.
pub struct JobRunner {
    pipeline: Arc<GenerationPipeline>,
    store: Arc<dyn RecordStore>,
    jobs: Arc<DashMap<String, JobState>>,
}

impl JobRunner {
    pub fn new(pipeline: Arc<GenerationPipeline>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            pipeline,
            store,
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub async fn submit(
        &self,
        request: GenerationRequest,
        options: RunOptions,
    ) -> Result<JobHandle> {
        request.validate()?;

        if !self.store.is_configured() {
            return Err(AppError::Sync(
                "background jobs require a configured record store".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let fields = RecordFields::new()
            .with("prompt", &request.prompt)
            .with("size", &request.size)
            .with("batch_count", request.batch_count)
            .with("reference_count", request.reference_images.len())
            .with_opt("reference_strength", request.reference_strength)
            .with("status", RecordStatus::Pending)
            .with("created_at", chrono::Utc::now().to_rfc3339());

        self.store.create_record(&id, fields).await?;
        self.jobs.insert(
            id.clone(),
            JobState {
                status: RecordStatus::Pending,
                result: None,
            },
        );
        info!(job_id = %id, "Job accepted");

        let pipeline = self.pipeline.clone();
        let store = self.store.clone();
        let jobs = self.jobs.clone();
        let job_id = id.clone();

        let task = tokio::spawn(async move {
            set_status(&jobs, &job_id, RecordStatus::Processing, None);
            if let Err(e) = store
                .update_record_status(&job_id, RecordStatus::Processing, RecordFields::new())
                .await
            {
                warn!(job_id = %job_id, error = %e, "Failed to mark job processing");
            }

            let result = pipeline.generate_images(request, options).await;
            let (status, patch) = completion_patch(&result);

            if let Err(e) = store.update_record_status(&job_id, status, patch).await {
                warn!(job_id = %job_id, error = %e, "Failed to record job outcome");
            }
            info!(job_id = %job_id, status = status.as_str(), "Job finished");
            set_status(&jobs, &job_id, status, Some(result));
        });

        Ok(JobHandle { id, task })
    }

    pub fn status(&self, id: &str) -> Option<JobState> {
        self.jobs.get(id).map(|state| state.clone())
    }

    /// Remove and return a finished job. Jobs still running are left in place.
    pub fn take(&self, id: &str) -> Option<JobState> {
        self.jobs
            .remove_if(id, |_, state| state.status.is_terminal())
            .map(|(_, state)| state)
    }

    /// Number of jobs currently tracked in process
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn set_status(
    jobs: &DashMap<String, JobState>,
    id: &str,
    status: RecordStatus,
    result: Option<GenerationResult>,
) {
    if let Some(mut state) = jobs.get_mut(id) {
        state.status = status;
        if result.is_some() {
            state.result = result;
        }
    }
}

fn completion_patch(result: &GenerationResult) -> (RecordStatus, RecordFields) {
    if !result.success {
        let patch = RecordFields::new().with_opt("error", result.error.as_deref());
        return (RecordStatus::Failed, patch);
    }

    let image_urls: Vec<&str> = result.images.iter().map(|i| i.url.as_str()).collect();
    let local_paths: Vec<String> = result
        .images
        .iter()
        .filter_map(|i| i.local_path.as_ref())
        .map(|p| p.to_string_lossy().to_string())
        .collect();

    let patch = RecordFields::new()
        .with("image_urls", image_urls)
        .with("local_paths", local_paths)
        .with("generated_count", result.images.len())
        .with("failed_count", result.failures.len())
        .with("total_ms", result.timing.total_ms);

    (RecordStatus::Completed, patch)
}
