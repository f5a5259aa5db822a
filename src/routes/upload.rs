use axum::extract::{Multipart, State};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::modality::Modality;
use crate::models::progress::{UploadForm, UploadResponse, DEFAULT_THRESHOLD};
use crate::services::pipeline::InferenceRequest;
use crate::services::{archive, registry, worker};

/// POST /upload: Accept a tile archive and start an inference job.
///
/// Only cheap checks happen here; folder and tile validation is left to the
/// worker so the response does not depend on the archive size.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut archive_bytes: Option<Vec<u8>> = None;
    let mut model_type: Option<String> = None;
    let mut modality: Option<String> = None;
    let mut threshold: Option<f32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                archive_bytes = Some(data.to_vec());
            }
            Some("model_type") => model_type = Some(read_text(field).await?),
            Some("modality") => {
                let value = read_text(field).await?;
                if !value.is_empty() {
                    modality = Some(value);
                }
            }
            Some("threshold") => {
                let value = read_text(field).await?;
                let parsed = value
                    .parse::<f32>()
                    .ok()
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| {
                        AppError::BadRequest(format!("threshold must be a number, got '{value}'"))
                    })?;
                threshold = Some(parsed);
            }
            _ => {}
        }
    }

    let form = UploadForm {
        model_type: model_type
            .ok_or_else(|| AppError::BadRequest("Missing 'model_type' field".to_string()))?,
        modality,
        threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
    };
    form.validate()?;

    let archive_bytes =
        archive_bytes.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;
    let summary =
        archive::inspect(&archive_bytes).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let spec = registry::lookup(&form.model_type).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if let Some(selected) = &form.modality {
        let selected: Modality = selected.parse().map_err(|_| {
            AppError::BadRequest(format!(
                "Unknown modality '{selected}'. Expected one of: satellite, bc, bh, bc+sat, all"
            ))
        })?;
        if selected != spec.modality {
            return Err(AppError::BadRequest(format!(
                "Model '{}' expects modality '{}' but '{}' was selected",
                spec.model_type, spec.modality, selected
            )));
        }
    }

    // The record must exist before the worker starts and before the id is returned.
    let job = state.jobs.create(spec.model_type);
    metrics::counter!("inference_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = %job.id,
        model_type = spec.model_type,
        rasters = summary.raster_count,
        bytes = archive_bytes.len(),
        "Inference job accepted"
    );

    worker::spawn_job(
        state.jobs.clone(),
        state.pipeline.clone(),
        state.slots.clone(),
        job.id,
        InferenceRequest {
            archive: archive_bytes,
            model: spec,
            threshold: form.threshold,
        },
    );

    Ok(Json(UploadResponse { job_id: job.id }))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map(|t| t.trim().to_string())
        .map_err(|e| AppError::BadRequest(format!("Malformed form field: {e}")))
}
