use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::models::job::{JobResult, ResultMetadata};
use crate::services::archive::{self, ArchiveError, TileArchive};
use crate::services::inference::{self, ModelCache, ModelError, TileError};
use crate::services::mosaic::{self, ArtifactPaths, GeoReference, MosaicError};
use crate::services::registry::ModelSpec;

/// Receives progress while the pipeline runs.
pub trait ProgressReporter: Send + Sync {
    /// Free-text description of the current step.
    fn stage(&self, message: &str);

    fn tiles_discovered(&self, total: usize);

    /// `processed` is the absolute number of finished tiles.
    fn tile_processed(&self, processed: usize, total: usize);
}

/// Everything needed to run inference on one upload.
pub struct InferenceRequest {
    pub archive: Vec<u8>,
    pub model: &'static ModelSpec,
    pub threshold: f32,
}

/// Resource caps applied to every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLimits {
    /// Largest decompressed archive entry, in bytes.
    pub max_entry_bytes: u64,
    /// Largest stitched canvas, in pixels.
    pub max_mosaic_pixels: u64,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: archive::DEFAULT_MAX_ENTRY_BYTES,
            max_mosaic_pixels: mosaic::DEFAULT_MAX_MOSAIC_PIXELS,
        }
    }
}

/// Model loading, per-tile inference and mosaicking.
pub struct Pipeline {
    models: Arc<ModelCache>,
    output_dir: PathBuf,
    public_path: String,
    default_georef: GeoReference,
    limits: PipelineLimits,
}

impl Pipeline {
    pub fn new(
        models: Arc<ModelCache>,
        output_dir: PathBuf,
        public_path: String,
        default_georef: GeoReference,
    ) -> Self {
        Self {
            models,
            output_dir,
            public_path,
            default_georef,
            limits: PipelineLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    /// Run the whole pipeline. Artifacts are named after `artifact_name`.
    pub fn run(
        &self,
        artifact_name: &str,
        request: InferenceRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, PipelineError> {
        let started = Instant::now();
        let spec = request.model;
        let modality = spec.modality;

        progress.stage("Scanning archive");
        let mut archive = TileArchive::open(request.archive, self.limits.max_entry_bytes)?;

        let expected: Vec<String> = modality
            .required_folders()
            .into_iter()
            .map(String::from)
            .collect();
        let found = archive.folders();
        let missing: Vec<String> = expected
            .iter()
            .filter(|f| !found.contains(f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingFolders {
                modality: modality.to_string(),
                missing,
                expected,
                found,
            });
        }

        // Every folder must hold exactly the primary folder's tiles.
        let primary = &expected[0];
        let tile_ids = archive.tile_ids(primary);
        for folder in &expected[1..] {
            let absent: Vec<String> = tile_ids
                .iter()
                .filter(|id| !archive.contains(folder, id))
                .cloned()
                .collect();
            if !absent.is_empty() {
                return Err(PipelineError::TileMismatch {
                    folder: folder.clone(),
                    missing: absent,
                });
            }
            let extra: Vec<String> = archive
                .tile_ids(folder)
                .into_iter()
                .filter(|id| !archive.contains(primary, id))
                .collect();
            if !extra.is_empty() {
                return Err(PipelineError::TileMismatch {
                    folder: primary.clone(),
                    missing: extra,
                });
            }
        }

        let total = tile_ids.len();
        progress.tiles_discovered(total);

        progress.stage(&format!("Loading model {}", spec.model_name));
        let model = self.models.get(spec)?;

        let cells = mosaic::layout(&tile_ids)?;
        let mut predictions = Vec::with_capacity(total);
        for (i, (tile_id, cell)) in tile_ids.iter().zip(cells).enumerate() {
            let rasters = expected
                .iter()
                .map(|folder| archive.read(folder, tile_id))
                .collect::<Result<Vec<_>, _>>()?;
            let input = inference::prepare_tile(modality, &rasters).map_err(|source| {
                PipelineError::Tile {
                    tile_id: tile_id.clone(),
                    source,
                }
            })?;
            let mask = model.predict(&input, request.threshold)?;
            predictions.push((cell, mask));

            progress.tile_processed(i + 1, total);
            tracing::debug!(tile_id = %tile_id, processed = i + 1, total, "Tile processed");
        }

        progress.stage("Stitching mosaic");
        let stitched = mosaic::stitch(&predictions, self.limits.max_mosaic_pixels)?;
        let georef = archive.georeference()?.unwrap_or(self.default_georef);
        let bounds = georef.bounds(stitched.origin, stitched.grid);
        if !bounds.is_well_formed() {
            return Err(PipelineError::Georeference);
        }

        progress.stage("Writing prediction raster");
        let paths = ArtifactPaths::new(&self.output_dir, &self.public_path, artifact_name);
        stitched.save(&paths.image)?;
        let leaflet_config = mosaic::leaflet_config(paths.url.clone(), bounds);
        let sidecar = serde_json::to_vec_pretty(&leaflet_config)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        std::fs::write(&paths.leaflet_config, sidecar).map_err(MosaicError::Io)?;

        Ok(JobResult {
            success: true,
            leaflet_config,
            metadata: ResultMetadata {
                model_type: spec.model_type.to_string(),
                model_name: model.name().to_string(),
                modality: modality.to_string(),
                threshold: request.threshold,
                tiles_processed: total,
                grid: stitched.grid,
                dimensions: stitched.dimensions(),
                positive_fraction: stitched.positive_fraction(),
                processing_seconds: started.elapsed().as_secs_f64(),
            },
        })
    }
}

/// Why a job failed. The `Display` text is shown to the end user.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(
        "Archive is missing folder(s) {} required by modality '{modality}' (expected: {}; found: {})",
        .missing.join(", "),
        .expected.join(", "),
        join_or_none(.found)
    )]
    MissingFolders {
        modality: String,
        missing: Vec<String>,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Tiles missing from folder '{folder}': {}", .missing.join(", "))]
    TileMismatch { folder: String, missing: Vec<String> },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Tile '{tile_id}' could not be processed: {source}")]
    Tile { tile_id: String, source: TileError },

    #[error(transparent)]
    Mosaic(#[from] MosaicError),

    #[error("Prediction bounds could not be computed from the tile georeference")]
    Georeference,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Reporter that only logs, for runs without a job record.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn stage(&self, message: &str) {
        tracing::info!(stage = message, "Pipeline stage");
    }

    fn tiles_discovered(&self, total: usize) {
        tracing::info!(total, "Tiles discovered");
    }

    fn tile_processed(&self, processed: usize, total: usize) {
        tracing::info!(processed, total, "Tile processed");
    }
}
