//! Generation scheduler: fans a request out into bounded-concurrency units
//! and pipelines each finished image straight into the download stage.

use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::backend::http_backend::HttpBackend;
use crate::backend::traits::{
    GeneratedImage, GenerationRequest, GenerationResult, GenerationUnit, ImageBackend,
    ImageInput, ImagePayload, ImageSize, SequentialMode, SequentialOptions, Timing, UnitFailure,
    Usage, MAX_BATCH_COUNT, MAX_REFERENCE_IMAGES,
};
use crate::config::{PipelineConfig, Settings};
use crate::error::{classify, AppError, Result};
use crate::input::{ImageResolver, PayloadCache};
use crate::response::Downloader;
use crate::sync::{GallerySync, HttpRecordStore};

/// Incremental notification delivered while a request runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Image { index: usize, image: GeneratedImage },
    Error { index: usize, message: String },
    Progress { completed: usize, total: usize },
    Completed { succeeded: usize, failed: usize },
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Per-call options
#[derive(Clone)]
pub struct RunOptions {
    pub download: bool,
    /// Overrides the configured download directory
    pub download_dir: Option<PathBuf>,
    pub progress: Option<ProgressCallback>,
    pub skip_external_sync: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            download: true,
            download_dir: None,
            progress: None,
            skip_external_sync: false,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn skip_external_sync(mut self, skip: bool) -> Self {
        self.skip_external_sync = skip;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }
}

/// Build the outbound payload and decide how many units to issue.
///
/// Blends of two or more references produce one image and switch off
/// sequential generation; a single reference also produces one image;
/// text-only requests fan out to `batch_count` units.
pub fn plan_units(
    model: &str,
    request: &GenerationRequest,
    resolved_images: Vec<String>,
    max_batch_count: u32,
) -> Result<(ImagePayload, usize)> {
    let size = ImageSize::parse(&request.size)?.as_api_value();
    let cap = max_batch_count.clamp(1, MAX_BATCH_COUNT);

    let (image, sequential, units) = match resolved_images.len() {
        0 => (None, SequentialMode::Auto, request.batch_count.clamp(1, cap) as usize),
        1 => {
            let single = resolved_images.into_iter().next().map(ImageInput::Single);
            (single, SequentialMode::Auto, 1)
        }
        _ => (
            Some(ImageInput::Multiple(resolved_images)),
            SequentialMode::Disabled,
            1,
        ),
    };

    let strength = image.as_ref().and(request.reference_strength);
    let sequential_image_generation_options =
        (sequential == SequentialMode::Auto).then_some(SequentialOptions { max_images: 1 });

    let payload = ImagePayload {
        model: model.to_string(),
        prompt: request.prompt.clone(),
        size,
        response_format: "url".to_string(),
        watermark: request.watermark,
        stream: true,
        image,
        strength,
        sequential_image_generation: sequential,
        sequential_image_generation_options,
    };

    Ok((payload, units))
}

/// What one unit produced, with offsets measured from dispatch
struct UnitReport {
    index: usize,
    outcome: std::result::Result<GeneratedImage, String>,
    generation_done: Duration,
    download_window: Option<(Duration, Duration)>,
}

impl UnitReport {
    fn failed(index: usize, message: String, generation_done: Duration) -> Self {
        Self {
            index,
            outcome: Err(message),
            generation_done,
            download_window: None,
        }
    }
}

/// The top-level coordinator
pub struct GenerationPipeline {
    backend: Arc<dyn ImageBackend>,
    resolver: ImageResolver,
    downloader: Arc<Downloader>,
    generation_permits: Arc<Semaphore>,
    gallery: Option<GallerySync>,
    download_dir: PathBuf,
    max_batch_count: u32,
    max_reference_images: usize,
}

impl GenerationPipeline {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        resolver: ImageResolver,
        downloader: Downloader,
        config: &PipelineConfig,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            resolver,
            downloader: Arc::new(downloader),
            generation_permits: Arc::new(Semaphore::new(config.generation_concurrency.max(1))),
            gallery: None,
            download_dir: download_dir.into(),
            max_batch_count: config.max_batch_count,
            max_reference_images: config.max_reference_images.min(MAX_REFERENCE_IMAGES),
        }
    }

    /// Wire the HTTP backend, cache, downloader and (if enabled) gallery sync from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&settings.api)?);
        let resolver = ImageResolver::new(Arc::new(PayloadCache::from_config(&settings.cache)));
        let downloader =
            Downloader::new(&settings.download, settings.pipeline.download_concurrency)?;

        let mut pipeline = Self::new(
            backend,
            resolver,
            downloader,
            &settings.pipeline,
            settings.download.directory(),
        );

        if settings.sync.enabled {
            let store = Arc::new(HttpRecordStore::new(&settings.sync)?);
            pipeline = pipeline.with_gallery(GallerySync::new(store));
        }

        Ok(pipeline)
    }

    pub fn with_gallery(mut self, gallery: GallerySync) -> Self {
        self.gallery = Some(gallery);
        self
    }

    pub fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    /// Run one request to completion.
    ///
    /// Never fails: pre-flight and unexpected errors come back as
    /// `success = false` with a classified message.
    pub async fn generate_images(
        &self,
        request: GenerationRequest,
        options: RunOptions,
    ) -> GenerationResult {
        let started = Instant::now();

        match self.run(&request, &options, started).await {
            Ok(result) => result,
            Err(e) => {
                let message = classify(&e);
                error!(error = %e, "Image generation request failed");
                GenerationResult::failed(message, elapsed_ms(started.elapsed()))
            }
        }
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
        started: Instant,
    ) -> Result<GenerationResult> {
        if !self.backend.has_credentials() {
            return Err(AppError::MissingCredentials);
        }

        request.validate()?;
        if request.reference_images.len() > self.max_reference_images {
            return Err(AppError::InvalidRequest(format!(
                "At most {} reference images are allowed, got {}",
                self.max_reference_images,
                request.reference_images.len()
            )));
        }

        let resolved = self.resolver.resolve_all(&request.reference_images).await?;
        let (payload, unit_count) =
            plan_units(self.backend.model(), request, resolved, self.max_batch_count)?;

        info!(
            units = unit_count,
            references = request.reference_images.len(),
            size = %payload.size,
            download = options.download,
            "Dispatching generation units"
        );

        let reports = self.run_units(payload, unit_count, options).await;

        let mut images = Vec::new();
        let mut failures = Vec::new();
        let mut generation_done = Duration::ZERO;
        let mut download_window: Option<(Duration, Duration)> = None;

        for report in reports {
            generation_done = generation_done.max(report.generation_done);
            if let Some((start, end)) = report.download_window {
                download_window = Some(match download_window {
                    Some((s, e)) => (s.min(start), e.max(end)),
                    None => (start, end),
                });
            }
            match report.outcome {
                Ok(image) => images.push(image),
                Err(message) => failures.push(UnitFailure {
                    index: report.index,
                    message,
                }),
            }
        }

        images.sort_by_key(|image| image.index);
        failures.sort_by_key(|failure| failure.index);

        options.emit(ProgressEvent::Completed {
            succeeded: images.len(),
            failed: failures.len(),
        });

        if !options.skip_external_sync {
            if let Some(gallery) = &self.gallery {
                gallery.sync_images(request, &images).await;
            }
        }

        let usage = Usage {
            generated_count: images.len(),
            approximate_tokens: images.iter().filter_map(|i| i.approximate_tokens()).sum(),
        };

        info!(
            succeeded = images.len(),
            failed = failures.len(),
            total_ms = elapsed_ms(started.elapsed()),
            "Generation request finished"
        );

        Ok(GenerationResult {
            success: true,
            images,
            usage: Some(usage),
            timing: Timing {
                generation_ms: elapsed_ms(generation_done),
                download_ms: download_window
                    .map_or(0, |(start, end)| elapsed_ms(end.saturating_sub(start))),
                total_ms: elapsed_ms(started.elapsed()),
            },
            error: None,
            failures,
        })
    }

    async fn run_units(
        &self,
        payload: ImagePayload,
        unit_count: usize,
        options: &RunOptions,
    ) -> Vec<UnitReport> {
        let dispatched = Instant::now();
        let download_dir = options
            .download_dir
            .clone()
            .unwrap_or_else(|| self.download_dir.clone());

        let mut tasks = JoinSet::new();
        let mut unit_of_task = HashMap::with_capacity(unit_count);
        for index in 1..=unit_count {
            let unit = GenerationUnit {
                index,
                payload: payload.clone(),
            };
            let backend = self.backend.clone();
            let permits = self.generation_permits.clone();
            let downloader = options.download.then(|| self.downloader.clone());
            let download_dir = download_dir.clone();

            let handle = tasks.spawn(async move {
                AssertUnwindSafe(run_unit(
                    unit,
                    backend,
                    permits,
                    downloader,
                    download_dir,
                    dispatched,
                ))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    UnitReport::failed(
                        index,
                        "Unexpected error: unit task panicked".to_string(),
                        dispatched.elapsed(),
                    )
                })
            });
            unit_of_task.insert(handle.id(), index);
        }

        collect_reports(tasks, &unit_of_task, unit_count, options, dispatched).await
    }
}

/// Drain unit tasks as they finish, emitting progress for each one.
///
/// A task that was cancelled still yields a failed report for its unit.
async fn collect_reports(
    mut tasks: JoinSet<UnitReport>,
    unit_of_task: &HashMap<task::Id, usize>,
    unit_count: usize,
    options: &RunOptions,
    dispatched: Instant,
) -> Vec<UnitReport> {
    let mut reports = Vec::with_capacity(unit_count);
    while let Some(joined) = tasks.join_next_with_id().await {
        let report = match joined {
            Ok((_, report)) => report,
            Err(e) => {
                let index = unit_of_task.get(&e.id()).copied().unwrap_or_default();
                error!(index, error = %e, "Generation unit task did not complete");
                UnitReport::failed(
                    index,
                    format!("Unexpected error: unit task did not complete: {}", e),
                    dispatched.elapsed(),
                )
            }
        };

        match &report.outcome {
            Ok(image) => options.emit(ProgressEvent::Image {
                index: report.index,
                image: image.clone(),
            }),
            Err(message) => options.emit(ProgressEvent::Error {
                index: report.index,
                message: message.clone(),
            }),
        }
        reports.push(report);
        options.emit(ProgressEvent::Progress {
            completed: reports.len(),
            total: unit_count,
        });
    }

    reports
}

/// Generate one image, release the generation slot, then download it.
///
/// A unit never holds a generation permit while waiting for a download permit.
async fn run_unit(
    unit: GenerationUnit,
    backend: Arc<dyn ImageBackend>,
    permits: Arc<Semaphore>,
    downloader: Option<Arc<Downloader>>,
    download_dir: PathBuf,
    dispatched: Instant,
) -> UnitReport {
    let index = unit.index;

    let generated = {
        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return UnitReport::failed(
                    index,
                    "Unexpected error: generation pool is closed".to_string(),
                    dispatched.elapsed(),
                )
            }
        };
        debug!(index, "Generation unit started");
        backend.generate_one(&unit).await
    };
    let generation_done = dispatched.elapsed();

    let mut image = match generated {
        Ok(image) => image,
        Err(e) => {
            let message = classify(&e);
            warn!(index, error = %e, "Generation unit failed");
            return UnitReport::failed(index, message, generation_done);
        }
    };

    let mut download_window = None;
    if let Some(downloader) = downloader {
        let start = dispatched.elapsed();
        match downloader.download(&image.url, &download_dir, index).await {
            Ok(file) => {
                image.local_path = Some(file.local_path);
                image.download_time_ms = Some(file.download_time_ms);
            }
            Err(e) => {
                warn!(index, url = %image.url, error = %e, "Keeping image without local copy");
            }
        }
        download_window = Some((start, dispatched.elapsed()));
    }

    UnitReport {
        index,
        outcome: Ok(image),
        generation_done,
        download_window,
    }
}

fn elapsed_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
