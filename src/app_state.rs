use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::services::{inference::ModelCache, job_store::JobStore, pipeline::Pipeline};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<JobStore>,
    pub pipeline: Arc<Pipeline>,
    /// Permits for jobs allowed to run inference concurrently.
    pub slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let models = Arc::new(ModelCache::new(config.models_dir.clone()));
        let pipeline = Pipeline::new(
            models,
            config.output_dir.clone(),
            config.public_path.clone(),
            config.georeference(),
        )
        .with_limits(config.pipeline_limits());
        let slots = Semaphore::new(config.max_concurrent_jobs.max(1));

        Self {
            config: Arc::new(config),
            jobs: Arc::new(JobStore::new()),
            pipeline: Arc::new(pipeline),
            slots: Arc::new(slots),
        }
    }
}
