use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the job metrics emitted by the service.
pub fn describe() {
    metrics::describe_counter!(
        "inference_jobs_submitted_total",
        "Inference jobs accepted by the upload endpoint"
    );
    metrics::describe_counter!(
        "inference_jobs_completed_total",
        "Inference jobs that produced a prediction mosaic"
    );
    metrics::describe_counter!(
        "inference_jobs_failed_total",
        "Inference jobs that ended in the failed state"
    );
    metrics::describe_histogram!(
        "inference_job_seconds",
        "Wall time spent running the inference pipeline for one job"
    );
    metrics::describe_gauge!(
        "inference_jobs_active",
        "Jobs currently running inference"
    );
}

/// Router exposing `GET /metrics` backed by the installed recorder.
pub fn router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// Prometheus text exposition of all recorded metrics.
async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
