use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::job_store::JobCounts;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub models_dir: ComponentHealth,
    pub jobs: JobCounts,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// GET /health: service status with checkpoint directory and job counts.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let models_dir = state.pipeline.models().models_dir();
    let models_check = if models_dir.is_dir() {
        ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        }
    } else {
        ComponentHealth {
            status: "error".to_string(),
            detail: Some(format!("{} is not a directory", models_dir.display())),
        }
    };

    let healthy = models_check.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            models_dir: models_check,
            jobs: state.jobs.counts(),
        },
    };

    (status_code, Json(response))
}
