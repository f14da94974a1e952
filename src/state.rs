//! Application state shared by the command handlers.

use std::sync::Arc;

use crate::config::SplitterConfig;
use crate::engine::SplitEngine;
use crate::error::AppError;
use crate::jobs::{JobManager, JobManagerConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// State handed to every command: configuration, the engine used for inline
/// splits, and the background job manager.
pub struct AppState {
    pub config: Arc<SplitterConfig>,
    pub engine: SplitEngine,
    pub jobs: Arc<JobManager>,
}

impl AppState {
    /// Validates `config` and starts a job manager on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration is invalid.
    pub fn new(config: SplitterConfig) -> Result<Self, AppError> {
        config.validate()?;
        let jobs = JobManager::start(JobManagerConfig::from_config(&config))?;

        Ok(Self {
            engine: SplitEngine::new(config.chunk_config()),
            config: Arc::new(config),
            jobs: Arc::new(jobs),
        })
    }

    /// Stops accepting jobs and waits for the running ones.
    pub async fn shutdown(&self) {
        self.jobs.shutdown().await;
    }
}
