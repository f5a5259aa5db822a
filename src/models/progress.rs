use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, JobResult, JobStatus};

/// Detection threshold used when the upload does not specify one.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Selection parameters sent alongside the uploaded archive.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UploadForm {
    #[garde(length(min = 1, max = 64))]
    pub model_type: String,

    #[garde(skip)]
    pub modality: Option<String>,

    #[garde(range(min = 0.0, max = 1.0))]
    pub threshold: f32,
}

/// Response after an archive has been accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
}

/// Snapshot returned by the progress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub tiles_total: usize,
    pub tiles_processed: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for ProgressResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            tiles_total: job.tiles_total,
            tiles_processed: job.tiles_processed,
            message: job.message,
            result: job.result,
            error: job.error,
        }
    }
}
