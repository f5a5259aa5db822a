use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::client::poller::{PollError, StatusSource};
use crate::models::progress::{ProgressResponse, UploadResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters sent with an archive upload.
#[derive(Debug, Clone)]
pub struct Submission {
    pub model_type: String,
    pub modality: Option<String>,
    pub threshold: Option<f32>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the upload and progress endpoints.
#[derive(Debug, Clone)]
pub struct ProgressClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProgressClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload an archive and return the id of the created job.
    pub async fn submit(
        &self,
        archive: Vec<u8>,
        file_name: &str,
        submission: &Submission,
    ) -> Result<Uuid, ClientError> {
        let mut form = Form::new()
            .part(
                "file",
                Part::bytes(archive)
                    .file_name(file_name.to_string())
                    .mime_str("application/zip")?,
            )
            .text("model_type", submission.model_type.clone());
        if let Some(modality) = &submission.modality {
            form = form.text("modality", modality.clone());
        }
        if let Some(threshold) = submission.threshold {
            form = form.text("threshold", threshold.to_string());
        }

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<UploadResponse>().await?;
        Ok(body.job_id)
    }
}

impl StatusSource for ProgressClient {
    async fn fetch(&self, job_id: Uuid) -> Result<ProgressResponse, PollError> {
        let response = self
            .http
            .get(format!("{}/progress/{job_id}", self.base_url))
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(PollError::NotFound(job_id)),
            status if !status.is_success() => {
                Err(PollError::Transport(format!("server returned {status}")))
            }
            _ => response
                .json::<ProgressResponse>()
                .await
                .map_err(|e| PollError::Malformed(e.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}
