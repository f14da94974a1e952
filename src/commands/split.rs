//! Split command handlers.
//!
//! These commands handle:
//! - Upload submission to the background job layer
//! - Submission of files already on local disk
//! - Inline (synchronous) splits
//! - Status polling and archive delivery details
//! - Release of delivered jobs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive::{archive_file_name, DOWNLOAD_NAME};
use crate::error::{AppError, ErrorKind, ErrorPresentation};
use crate::jobs::{run_split, JobId, JobState, SubmittedSplit};
use crate::state::AppState;
use crate::validation::{copy_upload, persist_upload, validate_upload, ValidatedUpload};

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// An uploaded file plus the column to split it by.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub file_name: String,
    pub column_name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitStarted {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitCompleted {
    /// The caller owns this file once returned.
    pub archive_path: PathBuf,
    pub download_name: String,
    pub files: Vec<String>,
}

/// Answer to a status poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SplitStatusResponse {
    Ready {
        #[serde(rename = "archivePath")]
        archive_path: PathBuf,
        #[serde(rename = "downloadName")]
        download_name: String,
        files: Vec<String>,
    },
    Processing {
        state: JobState,
    },
    Failed {
        kind: ErrorKind,
        error: ErrorPresentation,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Validates and persists an upload, then queues a split job.
///
/// # Errors
///
/// Returns a validation error (no job is created), `AppError::Io` if the
/// upload cannot be stored, or `AppError::QueueFull`.
pub async fn submit_split(
    state: &AppState,
    request: SplitRequest,
) -> Result<SplitStarted, AppError> {
    let upload = validate_upload(
        &state.config,
        &request.file_name,
        &request.column_name,
        request.payload.len() as u64,
    )?;

    let source_path = persist_upload(&state.config.upload_dir, &upload.file_name, request.payload).await?;
    enqueue(state, upload, source_path).await
}

/// Queues a split of a file already on local disk.
///
/// The file is validated like an upload and copied into the upload directory
/// in a streaming fashion, so it is never held in memory.
///
/// # Errors
///
/// Same as [`submit_split`], plus `AppError::Io` if `path` cannot be read.
pub async fn submit_split_file(
    state: &AppState,
    path: &Path,
    column_name: &str,
) -> Result<SplitStarted, AppError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

    let upload = validate_upload(&state.config, &file_name, column_name, metadata.len())?;

    let source_path = copy_upload(&state.config.upload_dir, &upload.file_name, path).await?;
    enqueue(state, upload, source_path).await
}

async fn enqueue(
    state: &AppState,
    upload: ValidatedUpload,
    source_path: PathBuf,
) -> Result<SplitStarted, AppError> {
    let submitted = state
        .jobs
        .submit(SubmittedSplit {
            source_path: source_path.clone(),
            original_file_name: upload.file_name,
            column: upload.column,
        })
        .await;

    match submitted {
        Ok(job_id) => Ok(SplitStarted { job_id }),
        Err(err) => {
            // The job was never created, so nothing else owns the upload
            if let Err(e) = tokio::fs::remove_file(&source_path).await {
                warn!(path = %source_path.display(), error = %e, "Failed to remove rejected upload");
            }
            Err(err)
        }
    }
}

/// Validates an upload and splits it inline, returning the archive.
///
/// The stored upload and the partition files are removed once the archive is
/// written or the run fails.
///
/// # Errors
///
/// Same validation errors as [`submit_split`], plus `AppError::ColumnNotFound`,
/// `AppError::EmptyResult` and I/O class errors from the run.
pub async fn split_now(
    state: &AppState,
    request: SplitRequest,
) -> Result<SplitCompleted, AppError> {
    let upload = validate_upload(
        &state.config,
        &request.file_name,
        &request.column_name,
        request.payload.len() as u64,
    )?;

    let source_path = persist_upload(&state.config.upload_dir, &upload.file_name, request.payload).await?;

    let run_id = JobId::generate(chrono::Utc::now());
    let output_dir = state.config.output_dir.join(run_id.as_str());
    let archive_path = state
        .config
        .archive_dir
        .join(archive_file_name(run_id.as_str()));

    info!(run_id = %run_id, column = %upload.column, "Inline split started");
    let outcome = run_split(
        &state.engine,
        source_path.clone(),
        upload.column,
        output_dir.clone(),
        archive_path.clone(),
    )
    .await;

    if let Err(e) = tokio::fs::remove_file(&source_path).await {
        warn!(path = %source_path.display(), error = %e, "Failed to remove upload");
    }
    if let Err(e) = tokio::fs::remove_dir_all(&output_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %output_dir.display(), error = %e, "Failed to remove split output");
        }
    }

    let result = outcome.map_err(|err| {
        warn!(run_id = %run_id, error = %err, "Inline split failed");
        err
    })?;

    Ok(SplitCompleted {
        archive_path,
        download_name: DOWNLOAD_NAME.to_string(),
        files: result.files,
    })
}

/// Reports where a job stands.
///
/// # Errors
///
/// Returns `AppError::JobNotFound` for unknown or released ids.
pub async fn split_status(state: &AppState, job_id: &str) -> Result<SplitStatusResponse, AppError> {
    let view = state.jobs.status(&JobId::from(job_id)).await?;

    let response = match view.state {
        JobState::Queued | JobState::Running => SplitStatusResponse::Processing { state: view.state },
        JobState::Succeeded => match view.archive_path {
            Some(archive_path) => SplitStatusResponse::Ready {
                archive_path,
                download_name: DOWNLOAD_NAME.to_string(),
                files: view.files,
            },
            None => {
                return Err(AppError::Internal(format!(
                    "Job {} succeeded without an archive",
                    job_id
                )))
            }
        },
        JobState::Failed => {
            let failure = view.error.ok_or_else(|| {
                AppError::Internal(format!("Job {} failed without an error", job_id))
            })?;
            SplitStatusResponse::Failed {
                kind: failure.kind,
                error: failure.presentation,
            }
        }
    };

    Ok(response)
}

/// Deletes a finished job's files after its archive has been delivered.
///
/// # Errors
///
/// Returns `AppError::JobNotFound` or `AppError::JobNotFinished`.
pub async fn release_split(state: &AppState, job_id: &str) -> Result<(), AppError> {
    state.jobs.release(&JobId::from(job_id)).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
