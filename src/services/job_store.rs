use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::models::job::{Job, JobResult, JobStatus};

/// Progress reported while tiles are still being processed never reaches 1.0;
/// only completion does.
const PROCESSING_PROGRESS_CEILING: f64 = 0.99;

/// In-memory job records shared between the HTTP handlers and the workers.
///
/// Every mutation takes the write lock and applies one whole transition, so a
/// concurrent reader sees either the old or the new record, never a mix.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

/// Number of jobs in each state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new queued job. The record is visible to readers before this returns.
    pub fn create(&self, model_type: &str) -> Job {
        let job = Job::queued(model_type);
        self.write().insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// `queued -> processing`. The tile count is not known yet.
    pub fn begin(&self, id: Uuid) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            if job.status != JobStatus::Queued {
                return Err(JobStoreError::InvalidTransition {
                    id,
                    from: job.status,
                    to: JobStatus::Processing,
                });
            }
            job.status = JobStatus::Processing;
            job.progress = 0.0;
            job.message = "Scanning archive".to_string();
            Ok(())
        })
    }

    pub fn set_total(&self, id: Uuid, total: usize) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            require_processing(job)?;
            if total < job.tiles_processed {
                return Err(JobStoreError::ProgressRegression {
                    id,
                    current: job.tiles_processed,
                    requested: total,
                });
            }
            job.tiles_total = total;
            job.progress = progress_of(job.tiles_processed, total).max(job.progress);
            job.message = format!("Found {total} tiles");
            Ok(())
        })
    }

    /// Record that `processed` tiles (absolute count) are done.
    pub fn record_tile(&self, id: Uuid, processed: usize) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            require_processing(job)?;
            if processed < job.tiles_processed {
                return Err(JobStoreError::ProgressRegression {
                    id,
                    current: job.tiles_processed,
                    requested: processed,
                });
            }
            if processed > job.tiles_total {
                return Err(JobStoreError::ExceedsTotal {
                    id,
                    processed,
                    total: job.tiles_total,
                });
            }
            job.tiles_processed = processed;
            job.progress = progress_of(processed, job.tiles_total).max(job.progress);
            job.message = format!("Processed {processed}/{} tiles", job.tiles_total);
            Ok(())
        })
    }

    pub fn set_message(&self, id: Uuid, message: &str) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            require_processing(job)?;
            job.message = message.to_string();
            Ok(())
        })
    }

    /// `processing -> completed`. Result and final progress land together.
    pub fn complete(&self, id: Uuid, result: JobResult) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            if job.status != JobStatus::Processing {
                return Err(JobStoreError::InvalidTransition {
                    id,
                    from: job.status,
                    to: JobStatus::Completed,
                });
            }
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            job.message = "Completed".to_string();
            job.result = Some(result);
            job.error = None;
            Ok(())
        })
    }

    /// `queued | processing -> failed`. Counters recorded so far are kept.
    pub fn fail(&self, id: Uuid, error: &str) -> Result<(), JobStoreError> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.message = "Failed".to_string();
            job.error = Some(error.to_string());
            job.result = None;
            Ok(())
        })
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.read();
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drop terminal jobs last touched before `cutoff`. Running jobs are kept.
    pub fn evict_terminal_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Result<(), JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobStoreError>,
    {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(JobStoreError::Terminal { id, status: job.status });
        }

        // Apply to a copy so a rejected transition leaves the record untouched.
        let mut next = job.clone();
        apply(&mut next)?;
        next.updated_at = Utc::now();
        *job = next;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn require_processing(job: &Job) -> Result<(), JobStoreError> {
    if job.status == JobStatus::Processing {
        Ok(())
    } else {
        Err(JobStoreError::NotProcessing { id: job.id, status: job.status })
    }
}

fn progress_of(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64).min(PROCESSING_PROGRESS_CEILING)
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} is already {status}")]
    Terminal { id: Uuid, status: JobStatus },

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: JobStatus, to: JobStatus },

    #[error("Job {id} is {status}, not processing")]
    NotProcessing { id: Uuid, status: JobStatus },

    #[error("Job {id} progress cannot go from {current} back to {requested}")]
    ProgressRegression { id: Uuid, current: usize, requested: usize },

    #[error("Job {id} reported {processed} tiles processed out of {total}")]
    ExceedsTotal { id: Uuid, processed: usize, total: usize },
}
