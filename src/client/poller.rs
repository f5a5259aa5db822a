use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{JobResult, JobStatus};
use crate::models::progress::ProgressResponse;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can return the current snapshot of a job.
pub trait StatusSource {
    fn fetch(&self, job_id: Uuid)
        -> impl Future<Output = Result<ProgressResponse, PollError>> + Send;
}

/// How a polled job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(JobResult),
    Failed {
        error: String,
        tiles_processed: usize,
        tiles_total: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Status request failed: {0}")]
    Transport(String),

    #[error("Unexpected status response: {0}")]
    Malformed(String),

    #[error("Polling cancelled")]
    Cancelled,
}

/// What a progress indicator needs from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub status: JobStatus,
    pub progress: f64,
    pub tiles_processed: usize,
    pub tiles_total: usize,
    pub message: String,
}

impl ProgressView {
    /// `processed/total tiles` once the total is known, the server message before that.
    pub fn describe(&self) -> String {
        if self.tiles_total > 0 {
            format!("{}/{} tiles", self.tiles_processed, self.tiles_total)
        } else {
            self.message.clone()
        }
    }
}

impl From<&ProgressResponse> for ProgressView {
    fn from(snapshot: &ProgressResponse) -> Self {
        Self {
            status: snapshot.status,
            progress: snapshot.progress,
            tiles_processed: snapshot.tiles_processed,
            tiles_total: snapshot.tiles_total,
            message: snapshot.message.clone(),
        }
    }
}

/// Fixed-interval status loop with an explicit stop condition.
///
/// Stops on a terminal status, on the first fetch error (no retries), or when
/// the cancellation token fires.
#[derive(Debug, Clone)]
pub struct ProgressPoller {
    interval: Duration,
}

impl Default for ProgressPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ProgressPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn run<S, F>(
        &self,
        source: &S,
        job_id: Uuid,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<PollOutcome, PollError>
    where
        S: StatusSource,
        F: FnMut(&ProgressView),
    {
        loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                fetched = source.fetch(job_id) => fetched?,
            };
            if snapshot.job_id != job_id {
                return Err(PollError::Malformed(format!(
                    "asked for job {job_id}, got {}",
                    snapshot.job_id
                )));
            }

            on_update(&ProgressView::from(&snapshot));

            match snapshot.status {
                JobStatus::Completed => {
                    return snapshot.result.map(PollOutcome::Completed).ok_or_else(|| {
                        PollError::Malformed("completed job has no result".to_string())
                    });
                }
                JobStatus::Failed => {
                    return Ok(PollOutcome::Failed {
                        error: snapshot.error.unwrap_or_else(|| "Job failed".to_string()),
                        tiles_processed: snapshot.tiles_processed,
                        tiles_total: snapshot.tiles_total,
                    });
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Owns the token of the poll currently in flight.
///
/// Starting a new poll cancels the previous one, and dropping the session
/// cancels whatever is still running.
#[derive(Debug, Default)]
pub struct PollSession {
    current: Option<CancellationToken>,
}

impl PollSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) -> CancellationToken {
        self.stop();
        let token = CancellationToken::new();
        self.current = Some(token.clone());
        token
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.stop();
    }
}
