use serde::Deserialize;
use std::path::PathBuf;

use crate::services::archive::DEFAULT_MAX_ENTRY_BYTES;
use crate::services::mosaic::{GeoReference, DEFAULT_MAX_MOSAIC_PIXELS};
use crate::services::pipeline::PipelineLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding model checkpoints referenced by the registry.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Directory the stitched prediction overlays are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// URL prefix under which `output_dir` is served.
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Maximum accepted request body for archive uploads, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Largest decompressed size of one archive entry, in bytes.
    #[serde(default = "default_max_tile_bytes")]
    pub max_tile_bytes: u64,

    /// Largest stitched overlay, in pixels.
    #[serde(default = "default_max_mosaic_pixels")]
    pub max_mosaic_pixels: u64,

    /// Number of jobs allowed to run inference at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Terminal jobs older than this many seconds are evicted. 0 disables eviction.
    #[serde(default)]
    pub job_ttl_secs: u64,

    /// How often the eviction sweep runs.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Longitude of the north-west corner of tile (0, 0).
    #[serde(default = "default_geo_origin_lon")]
    pub geo_origin_lon: f64,

    /// Latitude of the north-west corner of tile (0, 0).
    #[serde(default = "default_geo_origin_lat")]
    pub geo_origin_lat: f64,

    /// Edge length of one tile in Web Mercator metres.
    #[serde(default = "default_tile_ground_size_m")]
    pub tile_ground_size_m: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./trained_models")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./predictions")
}

fn default_public_path() -> String {
    "/predictions".to_string()
}

fn default_max_tile_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

fn default_max_mosaic_pixels() -> u64 {
    DEFAULT_MAX_MOSAIC_PIXELS
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_geo_origin_lon() -> f64 {
    -73.70
}

fn default_geo_origin_lat() -> f64 {
    45.60
}

fn default_tile_ground_size_m() -> f64 {
    2560.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            models_dir: default_models_dir(),
            output_dir: default_output_dir(),
            public_path: default_public_path(),
            max_upload_bytes: default_max_upload_bytes(),
            max_tile_bytes: default_max_tile_bytes(),
            max_mosaic_pixels: default_max_mosaic_pixels(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_ttl_secs: 0,
            reaper_interval_secs: default_reaper_interval_secs(),
            geo_origin_lon: default_geo_origin_lon(),
            geo_origin_lat: default_geo_origin_lat(),
            tile_ground_size_m: default_tile_ground_size_m(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Georeference applied to archives that do not ship their own `georef.json`.
    pub fn georeference(&self) -> GeoReference {
        GeoReference {
            origin_lon: self.geo_origin_lon,
            origin_lat: self.geo_origin_lat,
            tile_ground_size_m: self.tile_ground_size_m,
        }
    }

    pub fn pipeline_limits(&self) -> PipelineLimits {
        PipelineLimits {
            max_entry_bytes: self.max_tile_bytes,
            max_mosaic_pixels: self.max_mosaic_pixels,
        }
    }
}
