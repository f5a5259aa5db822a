//! Test app construction and request helpers.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use settlenet_serve::app_state::AppState;
use settlenet_serve::config::AppConfig;
use settlenet_serve::routes;
use settlenet_serve::services::registry::MODELS;

const BOUNDARY: &str = "settlenet-test-boundary";

/// A router over temporary model and output directories.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub models_dir: TempDir,
    pub output_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let models_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        write_checkpoints(&models_dir);

        let config = AppConfig {
            models_dir: models_dir.path().to_path_buf(),
            output_dir: output_dir.path().to_path_buf(),
            max_concurrent_jobs: 2,
            ..AppConfig::default()
        };
        let state = AppState::new(config);
        let router = routes::router(state.clone());

        Self {
            router,
            state,
            models_dir,
            output_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response.into_body()).await)
    }

    pub async fn upload(&self, archive: Vec<u8>, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        self.send(upload_request(archive, fields)).await
    }

    pub async fn progress(&self, job_id: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(format!("/progress/{job_id}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Poll until the job is completed or failed, returning every snapshot seen.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Vec<Value> {
        let mut snapshots = Vec::new();
        for _ in 0..500 {
            let (status, body) = self.progress(job_id).await;
            assert_eq!(status, StatusCode::OK, "progress lookup failed: {body}");
            let done = matches!(body["status"].as_str(), Some("completed" | "failed"));
            snapshots.push(body);
            if done {
                return snapshots;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}

/// Logistic checkpoints for every registered model, sized to their modality.
pub fn write_checkpoints(dir: &TempDir) {
    for spec in MODELS {
        let channels = spec.modality.input_channels();
        let checkpoint = serde_json::json!({
            "architecture": "pixel-logistic",
            "input_channels": channels,
            "weights": vec![1.0_f32; channels],
            "bias": 0.0,
        });
        std::fs::write(dir.path().join(spec.checkpoint), checkpoint.to_string()).unwrap();
    }
}

pub fn upload_request(archive: Vec<u8>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"tiles.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&archive);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
