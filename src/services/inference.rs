use image::DynamicImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::modality::{Band, Modality};
use crate::services::registry::ModelSpec;

/// Architecture tag of checkpoints the built-in engine can run.
pub const PIXEL_LOGISTIC: &str = "pixel-logistic";

/// Normalised model input for one tile, channel-major.
#[derive(Debug, Clone)]
pub struct TileInput {
    pub width: u32,
    pub height: u32,
    pub channels: Vec<Vec<f32>>,
}

/// Binary prediction for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    data: Vec<bool>,
}

impl Mask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; (width * height) as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.data[(y * self.width + x) as usize] = value;
    }

    pub fn positive_count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}

/// A loaded segmentation model.
pub trait SegmentationModel: Send + Sync {
    fn name(&self) -> &str;

    fn input_channels(&self) -> usize;

    /// Per-pixel settlement prediction at the given probability threshold.
    fn predict(&self, input: &TileInput, threshold: f32) -> Result<Mask, ModelError>;
}

/// Checkpoint file layout for the built-in per-pixel logistic engine.
#[derive(Debug, Deserialize)]
struct Checkpoint {
    architecture: String,
    input_channels: usize,
    weights: Vec<f32>,
    bias: f32,
}

/// Per-pixel logistic regression over the normalised input channels.
pub struct PixelLogisticModel {
    name: String,
    weights: Vec<f32>,
    bias: f32,
}

impl PixelLogisticModel {
    pub fn new(name: &str, weights: Vec<f32>, bias: f32) -> Self {
        Self {
            name: name.to_string(),
            weights,
            bias,
        }
    }

    /// Load a checkpoint and check it fits the model's modality.
    pub fn load(path: &Path, spec: &ModelSpec) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let checkpoint: Checkpoint =
            serde_json::from_slice(&raw).map_err(|e| ModelError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if checkpoint.architecture != PIXEL_LOGISTIC {
            return Err(ModelError::UnsupportedArchitecture(checkpoint.architecture));
        }
        if checkpoint.weights.len() != checkpoint.input_channels {
            return Err(ModelError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "{} weights for {} input channels",
                    checkpoint.weights.len(),
                    checkpoint.input_channels
                ),
            });
        }
        let expected = spec.modality.input_channels();
        if checkpoint.input_channels != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                found: checkpoint.input_channels,
            });
        }

        Ok(Self::new(spec.model_name, checkpoint.weights, checkpoint.bias))
    }
}

impl SegmentationModel for PixelLogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_channels(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, input: &TileInput, threshold: f32) -> Result<Mask, ModelError> {
        if input.channels.len() != self.weights.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.weights.len(),
                found: input.channels.len(),
            });
        }

        let mut mask = Mask::empty(input.width, input.height);
        for (i, pixel) in mask.data.iter_mut().enumerate() {
            let logit = self.bias
                + self
                    .weights
                    .iter()
                    .zip(&input.channels)
                    .map(|(w, channel)| w * channel[i])
                    .sum::<f32>();
            *pixel = sigmoid(logit) > threshold;
        }
        Ok(mask)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Process-wide cache of loaded models, keyed by model type.
///
/// Entries are inserted once and never replaced.
pub struct ModelCache {
    models_dir: PathBuf,
    loaded: Mutex<HashMap<&'static str, Arc<dyn SegmentationModel>>>,
}

impl ModelCache {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get(&self, spec: &ModelSpec) -> Result<Arc<dyn SegmentationModel>, ModelError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = loaded.get(spec.model_type) {
            return Ok(Arc::clone(model));
        }

        let path = self.models_dir.join(spec.checkpoint);
        let model: Arc<dyn SegmentationModel> = Arc::new(PixelLogisticModel::load(&path, spec)?);
        tracing::info!(
            model_type = spec.model_type,
            model_name = spec.model_name,
            path = %path.display(),
            "Loaded model checkpoint"
        );
        loaded.insert(spec.model_type, Arc::clone(&model));
        Ok(model)
    }
}

/// Decode the rasters of one tile and stack them into normalised model input.
///
/// `rasters` holds encoded bytes in the modality's band order.
pub fn prepare_tile(modality: Modality, rasters: &[Vec<u8>]) -> Result<TileInput, TileError> {
    let bands = modality.bands();
    if rasters.len() != bands.len() {
        return Err(TileError::BandCount {
            expected: bands.len(),
            found: rasters.len(),
        });
    }

    let mut size: Option<(u32, u32)> = None;
    let mut channels = Vec::with_capacity(modality.input_channels());

    for (band, raw) in bands.iter().zip(rasters) {
        let img = image::load_from_memory(raw).map_err(|e| TileError::Decode {
            folder: band.folder(),
            reason: e.to_string(),
        })?;
        let dims = (img.width(), img.height());
        match size {
            None => size = Some(dims),
            Some(expected) if expected != dims => {
                return Err(TileError::SizeMismatch {
                    folder: band.folder(),
                    expected,
                    found: dims,
                })
            }
            Some(_) => {}
        }

        for (c, mut values) in band_channels(*band, &img).into_iter().enumerate() {
            let (mean, std) = (band.mean()[c], band.std()[c]);
            for v in values.iter_mut() {
                *v = (*v - mean) / std;
            }
            channels.push(values);
        }
    }

    let (width, height) = size.unwrap_or((0, 0));
    Ok(TileInput { width, height, channels })
}

/// Raw channel values: satellite scaled to [0, 1], single bands kept as stored.
fn band_channels(band: Band, img: &DynamicImage) -> Vec<Vec<f32>> {
    match band {
        Band::Satellite => {
            let rgb = img.to_rgb32f();
            (0..3)
                .map(|c| rgb.pixels().map(|p| p.0[c]).collect())
                .collect()
        }
        Band::BuildingCount | Band::BuildingHeight => {
            let values = match img {
                DynamicImage::ImageLuma8(b) => b.pixels().map(|p| f32::from(p.0[0])).collect(),
                DynamicImage::ImageLuma16(b) => b.pixels().map(|p| f32::from(p.0[0])).collect(),
                DynamicImage::ImageRgb32F(b) => b.pixels().map(|p| p.0[0]).collect(),
                DynamicImage::ImageRgba32F(b) => b.pixels().map(|p| p.0[0]).collect(),
                other => other.to_luma32f().pixels().map(|p| p.0[0]).collect(),
            };
            vec![values]
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Model file {} could not be read: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Model checkpoint {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Checkpoint architecture '{0}' is not supported")]
    UnsupportedArchitecture(String),

    #[error("Model expects {expected} input channels but got {found}")]
    ShapeMismatch { expected: usize, found: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("expected {expected} rasters, found {found}")]
    BandCount { expected: usize, found: usize },

    #[error("{folder} raster could not be decoded: {reason}")]
    Decode { folder: &'static str, reason: String },

    #[error("{folder} raster is {found:?} but other bands are {expected:?}")]
    SizeMismatch {
        folder: &'static str,
        expected: (u32, u32),
        found: (u32, u32),
    },
}
