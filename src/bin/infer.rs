use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use settlenet_serve::config::AppConfig;
use settlenet_serve::models::progress::DEFAULT_THRESHOLD;
use settlenet_serve::services::inference::ModelCache;
use settlenet_serve::services::pipeline::{InferenceRequest, LogProgress, Pipeline};
use settlenet_serve::services::registry;

/// Run segmentation on a tile archive without the HTTP service.
#[derive(Parser, Debug)]
#[command(name = "infer", version)]
struct Args {
    /// ZIP archive of tiles laid out in modality folders.
    archive: PathBuf,

    /// Registry key of the model to run (e.g. convnext_satellite).
    #[arg(long, short = 'm')]
    model_type: String,

    /// Probability above which a pixel is classified as settlement.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Overrides OUTPUT_DIR.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Overrides MODELS_DIR.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Base name of the written artifacts. Defaults to the archive file stem.
    #[arg(long)]
    name: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(error = %message, "Inference failed");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let mut config = AppConfig::from_env().map_err(|e| format!("Invalid configuration: {e}"))?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = args.models_dir {
        config.models_dir = dir;
    }
    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(format!("Threshold must be within [0, 1], got {}", args.threshold));
    }

    let spec = registry::lookup(&args.model_type).map_err(|e| e.to_string())?;
    let bytes = std::fs::read(&args.archive)
        .map_err(|e| format!("Cannot read {}: {e}", args.archive.display()))?;
    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| format!("Cannot create {}: {e}", config.output_dir.display()))?;

    let name = args.name.unwrap_or_else(|| {
        args.archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "prediction".to_string())
    });

    let pipeline = Pipeline::new(
        Arc::new(ModelCache::new(config.models_dir.clone())),
        config.output_dir.clone(),
        config.public_path.clone(),
        config.georeference(),
    )
    .with_limits(config.pipeline_limits());
    let request = InferenceRequest {
        archive: bytes,
        model: spec,
        threshold: args.threshold,
    };

    let result = pipeline
        .run(&name, request, &LogProgress)
        .map_err(|e| e.to_string())?;

    let rendered =
        serde_json::to_string_pretty(&result.leaflet_config).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}
