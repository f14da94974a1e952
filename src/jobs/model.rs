//! Job identity, lifecycle states and the records kept per job.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::SplitResult;
use crate::error::{AppError, ErrorKind, ErrorPresentation};

// ─────────────────────────────────────────────────────────────────────────────
// JobState Enum
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a split job.
///
/// Transitions are `Queued → Running → Succeeded | Failed`; nothing leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Accepted and waiting for a worker slot.
    Queued,
    /// The split engine is running.
    Running,
    /// Archive written.
    Succeeded,
    /// Run aborted; see the job's error.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        }
    }

    /// Returns true if the job cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobId
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque job identifier: submission time plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Builds an id from the submission time, e.g. `20240131_142501_123_9f8e7d6c`.
    pub fn generate(submitted_at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        JobId(format!(
            "{}_{}",
            submitted_at.format("%Y%m%d_%H%M%S_%3f"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A split handed to the job manager.
#[derive(Debug, Clone)]
pub struct SubmittedSplit {
    /// Persisted upload to read from.
    pub source_path: PathBuf,
    /// Name of the file as uploaded.
    pub original_file_name: String,
    pub column: String,
}

/// Failure recorded on a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub presentation: ErrorPresentation,
}

impl From<&AppError> for JobFailure {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            presentation: err.to_presentation(),
        }
    }
}

/// Everything the manager tracks about one job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub source_path: PathBuf,
    pub original_file_name: String,
    pub column: String,
    pub output_dir: PathBuf,
    pub archive_path: PathBuf,
    pub state: JobState,
    pub error: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<SplitResult>,
}

impl JobRecord {
    pub fn queued(
        id: JobId,
        split: SubmittedSplit,
        output_dir: PathBuf,
        archive_path: PathBuf,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_path: split.source_path,
            original_file_name: split.original_file_name,
            column: split.column,
            output_dir,
            archive_path,
            state: JobState::Queued,
            error: None,
            submitted_at,
            started_at: None,
            finished_at: None,
            result: None,
        }
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            id: self.id.clone(),
            state: self.state,
            file_name: self.original_file_name.clone(),
            column: self.column.clone(),
            archive_path: match self.state {
                JobState::Succeeded => Some(self.archive_path.clone()),
                _ => None,
            },
            files: self
                .result
                .as_ref()
                .map(|r| r.files.clone())
                .unwrap_or_default(),
            error: self.error.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Read-only snapshot of a job, returned to pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub state: JobState,
    pub file_name: String,
    pub column: String,
    /// Set once the job has succeeded.
    pub archive_path: Option<PathBuf>,
    pub files: Vec<String>,
    pub error: Option<JobFailure>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}
