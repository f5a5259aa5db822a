use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of an inference job.
///
/// `queued -> processing -> {completed, failed}`. Terminal states never change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One inference request tracked from submission to terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub model_type: String,
    pub status: JobStatus,
    pub progress: f64,
    pub tiles_total: usize,
    pub tiles_processed: usize,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl Job {
    pub fn queued(model_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            model_type: model_type.to_string(),
            status: JobStatus::Queued,
            progress: 0.0,
            tiles_total: 0,
            tiles_processed: 0,
            message: "Waiting for an inference slot".to_string(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }
}

/// Payload handed to the map view once a job completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub success: bool,
    pub leaflet_config: LeafletConfig,
    pub metadata: ResultMetadata,
}

/// Everything a Leaflet image overlay needs to place the prediction raster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeafletConfig {
    pub tiff_url: String,
    pub bounds: Bounds,
    /// `[lat, lon]`, the order Leaflet expects.
    pub center: [f64; 2],
    pub zoom_levels: ZoomLevels,
    pub crs: String,
    pub opacity: f64,
}

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn center(&self) -> [f64; 2] {
        [
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        ]
    }

    pub fn is_well_formed(&self) -> bool {
        [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite())
            && self.south < self.north
            && self.west < self.east
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoomLevels {
    pub min: u8,
    pub max: u8,
    pub initial: u8,
}

/// Summary of the run that produced a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    pub model_type: String,
    pub model_name: String,
    pub modality: String,
    pub threshold: f32,
    pub tiles_processed: usize,
    pub grid: GridSize,
    pub dimensions: Dimensions,
    /// Share of mosaic pixels predicted as settlement.
    pub positive_fraction: f64,
    pub processing_seconds: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridSize {
    pub cols: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(JobStatus::Processing).unwrap(),
            serde_json::json!("processing")
        );
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert_eq!(JobStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_bounds_shape_checks() {
        let ok = Bounds { south: 45.0, west: -74.0, north: 45.5, east: -73.5 };
        assert!(ok.is_well_formed());
        assert_eq!(ok.center(), [45.25, -73.75]);

        let flipped = Bounds { south: 45.5, west: -74.0, north: 45.0, east: -73.5 };
        assert!(!flipped.is_well_formed());

        let nan = Bounds { south: f64::NAN, west: -74.0, north: 45.0, east: -73.5 };
        assert!(!nan.is_well_formed());
    }

    #[test]
    fn test_new_job_is_queued_without_outcome() {
        let job = Job::queued("convnext_satellite");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }
}
