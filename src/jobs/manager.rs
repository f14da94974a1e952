//! Background job manager for split runs.
//!
//! Jobs are queued on a bounded channel and pulled by a single dispatcher,
//! which waits for one of `max_concurrent_jobs` semaphore slots before
//! spawning each worker. Pollers only ever take the read side of the job
//! table.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::model::{JobFailure, JobId, JobRecord, JobState, JobStatusView, SubmittedSplit};
use crate::archive::{archive_file_name, Archiver};
use crate::config::SplitterConfig;
use crate::engine::{SplitEngine, SplitResult};
use crate::error::AppError;
use crate::streaming::ChunkConfig;

const POLL_INITIAL: Duration = Duration::from_millis(50);
const POLL_MAX: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for one job manager.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Each job writes its partitions to `output_root/<job id>`.
    pub output_root: PathBuf,
    pub archive_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub chunk_config: ChunkConfig,
}

impl JobManagerConfig {
    pub fn from_config(config: &SplitterConfig) -> Self {
        Self {
            output_root: config.output_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            max_concurrent_jobs: config.max_concurrent_jobs,
            queue_capacity: config.queue_capacity,
            chunk_config: config.chunk_config(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared run logic
// ─────────────────────────────────────────────────────────────────────────────

/// Runs one split and archives its output.
///
/// # Errors
///
/// Returns `AppError::EmptyResult` when no partition file was produced, and
/// any error from the engine or the archiver.
pub async fn run_split(
    engine: &SplitEngine,
    source: PathBuf,
    column: String,
    output_dir: PathBuf,
    archive_path: PathBuf,
) -> Result<SplitResult, AppError> {
    let result = engine
        .run_async(source, column.clone(), output_dir.clone())
        .await?;

    if result.is_empty() {
        return Err(AppError::EmptyResult { column });
    }

    tokio::task::spawn_blocking(move || Archiver.archive_dir(&output_dir, &archive_path))
        .await
        .map_err(|e| AppError::Internal(format!("Archive task join error: {}", e)))??;

    Ok(result)
}

struct Shared {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    engine: SplitEngine,
}

impl Shared {
    /// Moves a queued job to Running and returns what the worker needs.
    async fn start_job(&self, id: &JobId) -> Option<(PathBuf, String, PathBuf, PathBuf)> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(id)?;
        record.state = JobState::Running;
        record.started_at = Some(Utc::now());
        Some((
            record.source_path.clone(),
            record.column.clone(),
            record.output_dir.clone(),
            record.archive_path.clone(),
        ))
    }

    async fn finish_job(&self, id: &JobId, outcome: Result<SplitResult, AppError>) {
        let mut jobs = self.jobs.write().await;
        let Some(record) = jobs.get_mut(id) else {
            warn!(job_id = %id, "Finished job no longer tracked");
            return;
        };

        record.finished_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                info!(
                    job_id = %id,
                    files = result.files.len(),
                    rows = result.total_rows(),
                    "Job succeeded"
                );
                record.state = JobState::Succeeded;
                record.result = Some(result);
            }
            Err(err) => {
                error!(job_id = %id, kind = ?err.kind(), error = %err, "Job failed");
                record.state = JobState::Failed;
                record.error = Some(JobFailure::from(&err));
            }
        }
    }

    /// Fails a job whose worker died before recording an outcome.
    async fn abandon_job(&self, id: &JobId, err: AppError) {
        let unfinished = self
            .jobs
            .read()
            .await
            .get(id)
            .is_some_and(|record| !record.state.is_terminal());
        if unfinished {
            self.finish_job(id, Err(err)).await;
        }
    }

    async fn run_job(&self, id: JobId) {
        let Some((source, column, output_dir, archive_path)) = self.start_job(&id).await else {
            warn!(job_id = %id, "Dequeued job no longer tracked");
            return;
        };

        info!(job_id = %id, column = %column, "Job started");
        let outcome = run_split(&self.engine, source, column, output_dir, archive_path).await;
        self.finish_job(&id, outcome).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the job table, the submission queue and the dispatcher task.
pub struct JobManager {
    shared: Arc<Shared>,
    config: JobManagerConfig,
    slots: Arc<Semaphore>,
    sender: Mutex<Option<mpsc::Sender<JobId>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    /// Creates a manager and spawns its dispatcher on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a zero concurrency limit or queue capacity.
    pub fn start(config: JobManagerConfig) -> Result<Self, AppError> {
        if config.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must be greater than 0".into()));
        }
        if config.max_concurrent_jobs == 0 {
            return Err(AppError::Config("max_concurrent_jobs must be greater than 0".into()));
        }
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        let shared = Arc::new(Shared {
            jobs: RwLock::new(HashMap::new()),
            engine: SplitEngine::new(config.chunk_config.clone()),
        });

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let dispatcher = tokio::spawn(dispatch(rx, shared.clone(), slots.clone()));

        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            queue_capacity = config.queue_capacity,
            "Job manager started"
        );

        Ok(Self {
            shared,
            config,
            slots,
            sender: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    /// Takes every free worker slot so dispatched jobs stay Queued until the
    /// permits are dropped.
    #[cfg(test)]
    pub(crate) fn hold_all_slots(&self) -> Vec<tokio::sync::OwnedSemaphorePermit> {
        std::iter::from_fn(|| self.slots.clone().try_acquire_owned().ok()).collect()
    }

    /// Records a Queued job and hands it to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `AppError::QueueFull` when the queue is at capacity (the job is
    /// not kept) and `AppError::Internal` after shutdown.
    pub async fn submit(&self, split: SubmittedSplit) -> Result<JobId, AppError> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::Internal("Job manager is shut down".into()))?;

        let submitted_at = Utc::now();
        let id = JobId::generate(submitted_at);
        let output_dir = self.config.output_root.join(id.as_str());
        let archive_path = self
            .config
            .archive_dir
            .join(archive_file_name(id.as_str()));
        let column = split.column.clone();

        let record = JobRecord::queued(id.clone(), split, output_dir, archive_path, submitted_at);
        self.shared.jobs.write().await.insert(id.clone(), record);

        if let Err(e) = sender.try_send(id.clone()) {
            self.shared.jobs.write().await.remove(&id);
            return Err(match e {
                TrySendError::Full(_) => {
                    warn!(job_id = %id, "Split queue full, rejecting job");
                    AppError::QueueFull
                }
                TrySendError::Closed(_) => AppError::Internal("Job queue closed".into()),
            });
        }

        info!(job_id = %id, column = %column, "Job queued");
        Ok(id)
    }

    /// Returns a snapshot of the job.
    ///
    /// # Errors
    ///
    /// Returns `AppError::JobNotFound` for unknown or released ids.
    pub async fn status(&self, id: &JobId) -> Result<JobStatusView, AppError> {
        self.shared
            .jobs
            .read()
            .await
            .get(id)
            .map(JobRecord::view)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    /// All tracked jobs, newest first.
    pub async fn list(&self) -> Vec<JobStatusView> {
        let mut views: Vec<JobStatusView> = self
            .shared
            .jobs
            .read()
            .await
            .values()
            .map(JobRecord::view)
            .collect();
        views.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        views
    }

    /// Polls until the job reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::JobNotFound` for unknown ids and
    /// `AppError::JobNotFinished` if `timeout` elapses first.
    pub async fn wait_for_terminal(
        &self,
        id: &JobId,
        timeout: Duration,
    ) -> Result<JobStatusView, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut delay = POLL_INITIAL;

        loop {
            let view = self.status(id).await?;
            if view.state.is_terminal() {
                return Ok(view);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(AppError::JobNotFinished(id.to_string()));
            }

            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }

    /// Forgets a terminal job and deletes its upload, output directory and
    /// archive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::JobNotFound` for unknown ids,
    /// `AppError::JobNotFinished` for queued or running jobs, and
    /// `AppError::Io` if a file cannot be removed.
    pub async fn release(&self, id: &JobId) -> Result<(), AppError> {
        let record = {
            let mut jobs = self.shared.jobs.write().await;
            let state = jobs
                .get(id)
                .map(|r| r.state)
                .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
            if !state.is_terminal() {
                return Err(AppError::JobNotFinished(id.to_string()));
            }
            jobs.remove(id)
                .ok_or_else(|| AppError::JobNotFound(id.to_string()))?
        };

        remove_path(&record.source_path, false).await?;
        remove_path(&record.output_dir, true).await?;
        remove_path(&record.archive_path, false).await?;

        info!(job_id = %id, "Job released");
        Ok(())
    }

    /// Closes the queue and waits for queued and running jobs to finish.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();

        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }
        info!("Job manager stopped");
    }
}

async fn remove_path(path: &Path, is_dir: bool) -> Result<(), AppError> {
    let result = if is_dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Io(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

fn log_worker_exit(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Split worker task failed");
    }
}

/// Runs `work` as its own task so a panic inside it fails job `id` instead of
/// leaving it Running.
async fn supervise<F>(shared: Arc<Shared>, id: JobId, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(work).await {
        error!(job_id = %id, error = %e, "Split worker panicked");
        shared
            .abandon_job(&id, AppError::Internal(format!("Split worker stopped: {}", e)))
            .await;
    }
}

/// Pulls queued jobs and runs each once a worker slot is free.
async fn dispatch(mut rx: mpsc::Receiver<JobId>, shared: Arc<Shared>, slots: Arc<Semaphore>) {
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            Some(result) = workers.join_next(), if !workers.is_empty() => {
                log_worker_exit(result);
            }
            next = rx.recv() => {
                let Some(id) = next else { break };

                let permit = match slots.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        shared
                            .finish_job(&id, Err(AppError::Internal("Worker slots closed".into())))
                            .await;
                        continue;
                    }
                };
                debug!(job_id = %id, free_slots = slots.available_permits(), "Dispatching job");

                let shared = shared.clone();
                workers.spawn(async move {
                    let _permit = permit;
                    let runner = shared.clone();
                    let job = id.clone();
                    supervise(shared, id, async move { runner.run_job(job).await }).await;
                });
            }
        }
    }

    while let Some(result) = workers.join_next().await {
        log_worker_exit(result);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
