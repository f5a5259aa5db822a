use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::services::job_store::JobStore;
use crate::services::pipeline::{InferenceRequest, Pipeline, ProgressReporter};

/// Message stored when the pipeline dies without returning an error.
const CRASH_MESSAGE: &str = "Inference worker crashed unexpectedly";

/// Publishes pipeline progress into the job's record.
pub struct JobProgress {
    store: Arc<JobStore>,
    job_id: Uuid,
}

impl JobProgress {
    pub fn new(store: Arc<JobStore>, job_id: Uuid) -> Self {
        Self { store, job_id }
    }
}

impl ProgressReporter for JobProgress {
    fn stage(&self, message: &str) {
        if let Err(e) = self.store.set_message(self.job_id, message) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to publish stage");
        }
    }

    fn tiles_discovered(&self, total: usize) {
        if let Err(e) = self.store.set_total(self.job_id, total) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to publish tile count");
        }
    }

    fn tile_processed(&self, processed: usize, _total: usize) {
        if let Err(e) = self.store.record_tile(self.job_id, processed) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to publish tile progress");
        }
    }
}

/// Launch the background task for a job that is already recorded as queued.
///
/// Every outcome of the pipeline, including a panic, ends in a terminal state.
pub fn spawn_job(
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    slots: Arc<Semaphore>,
    job_id: Uuid,
    request: InferenceRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _permit = match slots.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                fail(&store, job_id, "Inference service is shutting down");
                return;
            }
        };

        if let Err(e) = store.begin(job_id) {
            tracing::warn!(job_id = %job_id, error = %e, "Job could not start");
            return;
        }

        tracing::info!(
            job_id = %job_id,
            model_type = request.model.model_type,
            threshold = request.threshold,
            "Processing inference job"
        );
        metrics::gauge!("inference_jobs_active").increment(1.0);
        let started = Instant::now();

        let reporter = JobProgress::new(Arc::clone(&store), job_id);
        let artifact_name = job_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            pipeline.run(&artifact_name, request, &reporter)
        })
        .await;

        metrics::gauge!("inference_jobs_active").decrement(1.0);
        metrics::histogram!("inference_job_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(result)) => {
                let tiles = result.metadata.tiles_processed;
                match store.complete(job_id, result) {
                    Ok(()) => {
                        metrics::counter!("inference_jobs_completed_total").increment(1);
                        tracing::info!(job_id = %job_id, tiles, "Job completed successfully");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to record result");
                        fail(&store, job_id, "Result could not be recorded");
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Job processing failed");
                fail(&store, job_id, &e.to_string());
            }
            Err(join_error) => {
                tracing::error!(job_id = %job_id, error = %join_error, "Inference task panicked");
                fail(&store, job_id, CRASH_MESSAGE);
            }
        }
    })
}

fn fail(store: &JobStore, job_id: Uuid, message: &str) {
    match store.fail(job_id, message) {
        Ok(()) => {
            metrics::counter!("inference_jobs_failed_total").increment(1);
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job as failed");
        }
    }
}
