//! Command line entry point for the image generation pipeline

use clap::{Parser, Subcommand};
use gen_image_pipeline::{
    config::{LoggingConfig, Settings},
    queue::{GenerationPipeline, JobRunner, ProgressEvent, RunOptions},
    sync::{HttpRecordStore, NoopStore, RecordStore},
    GenerationRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "gen-pipeline", version, about = "Generate images through a streaming pipeline")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images and wait for the result
    Generate(GenerateArgs),
    /// Record a background job and run it before exiting
    Submit(GenerateArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    prompt: String,
    #[arg(long, default_value = "2K")]
    size: String,
    #[arg(long, default_value_t = 1)]
    batch: u32,
    /// Reference image (URL, data URL or local path); repeatable
    #[arg(long = "image")]
    images: Vec<String>,
    #[arg(long)]
    strength: Option<f32>,
    #[arg(long)]
    watermark: bool,
    #[arg(long)]
    no_download: bool,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    skip_sync: bool,
}

impl GenerateArgs {
    fn request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.prompt.clone())
            .with_size(self.size.clone())
            .with_batch_count(self.batch)
            .with_reference_images(self.images.clone())
            .with_watermark(self.watermark);
        if let Some(strength) = self.strength {
            request = request.with_strength(strength);
        }
        request
    }

    fn options(&self, settings: &Settings) -> RunOptions {
        let mut options = RunOptions::new()
            .with_download(settings.download.enabled && !self.no_download)
            .skip_external_sync(self.skip_sync)
            .with_progress(Arc::new(log_progress));
        if let Some(dir) = &self.output_dir {
            options = options.with_download_dir(dir.clone());
        }
        options
    }
}

fn log_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::Image { index, image } => {
            info!(index, url = %image.url, local_path = ?image.local_path, "Image ready")
        }
        ProgressEvent::Error { index, message } => warn!(index, error = %message, "Image failed"),
        ProgressEvent::Progress { completed, total } => info!(completed, total, "Progress"),
        ProgressEvent::Completed { succeeded, failed } => {
            info!(succeeded, failed, "All units finished")
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load_from_path(&cli.config)?;
    settings.validate()?;
    init_tracing(&settings.logging);

    info!(
        model = %settings.api.model,
        generation_concurrency = settings.pipeline.generation_concurrency,
        download_concurrency = settings.pipeline.download_concurrency,
        "Loaded configuration"
    );

    let pipeline = Arc::new(GenerationPipeline::from_settings(&settings)?);

    match cli.command {
        Command::Generate(args) => {
            let result = pipeline
                .generate_images(args.request(), args.options(&settings))
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Submit(args) => {
            let store: Arc<dyn RecordStore> = if settings.sync.enabled {
                Arc::new(HttpRecordStore::new(&settings.sync)?)
            } else {
                Arc::new(NoopStore)
            };
            let runner = JobRunner::new(pipeline, store);
            let handle = runner.submit(args.request(), args.options(&settings)).await?;
            println!("{}", serde_json::json!({ "job_id": handle.id, "status": "pending" }));

            handle.task.await?;
            if let Some(state) = runner.take(&handle.id) {
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
        }
    }

    Ok(())
}
