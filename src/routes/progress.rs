use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::progress::ProgressResponse;

/// GET /progress/{job_id}: Current snapshot of a job.
///
/// Never waits for progress. Ids that are unknown or not UUIDs are 404.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<ProgressResponse>> {
    let job = Uuid::parse_str(&job_id)
        .ok()
        .and_then(|id| state.jobs.get(id))
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    Ok(Json(job.into()))
}
