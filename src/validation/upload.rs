//! Upload validation and persistence.
//!
//! Validation is synchronous and happens before any job exists, so a rejected
//! upload never leaves state behind.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::SplitterConfig;
use crate::error::AppError;

/// An upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Final path component of the submitted name.
    pub file_name: String,
    /// Column name with surrounding whitespace removed.
    pub column: String,
}

/// Lowercased extension of `file_name`, if it has one.
fn extension_of(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() && extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// Checks an upload against the configured limits.
///
/// Checks run in order: file name present, column name present, extension
/// allowed, payload non-empty, payload within the size limit.
///
/// # Errors
///
/// Returns the `AppError` validation variant for the first failed check.
pub fn validate_upload(
    config: &SplitterConfig,
    file_name: &str,
    column_name: &str,
    payload_len: u64,
) -> Result<ValidatedUpload, AppError> {
    let file_name = Path::new(file_name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if file_name.is_empty() {
        return Err(AppError::EmptyUpload);
    }

    let column = column_name.trim();
    if column.is_empty() {
        return Err(AppError::MissingColumnName);
    }

    match extension_of(&file_name) {
        Some(ext) if config.is_allowed_extension(&ext) => {}
        _ => return Err(AppError::UnsupportedFileType { file_name }),
    }

    if payload_len == 0 {
        return Err(AppError::EmptyUpload);
    }
    if payload_len > config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge {
            size: payload_len,
            limit: config.max_upload_bytes,
        });
    }

    Ok(ValidatedUpload {
        file_name,
        column: column.to_string(),
    })
}

/// Random characters between the timestamp and the file name.
const UNIQUE_LEN: usize = 8;

/// Creates a fresh file `upload_dir/<timestamp>_<random>_<file_name>`, fills
/// it and keeps it. The name is claimed with `O_EXCL`, so concurrent uploads
/// of the same file name never share a path.
fn store_upload<F>(upload_dir: &Path, file_name: &str, fill: F) -> Result<PathBuf, AppError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    std::fs::create_dir_all(upload_dir).map_err(|e| {
        AppError::Io(format!("Failed to create {}: {}", upload_dir.display(), e))
    })?;

    let prefix = format!("{}_", Utc::now().format("%Y%m%d_%H%M%S_%3f"));
    let suffix = format!("_{}", file_name);
    let mut named = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(UNIQUE_LEN)
        .tempfile_in(upload_dir)
        .map_err(|e| AppError::Io(format!("Failed to create upload file: {}", e)))?;

    fill(named.as_file_mut())
        .and_then(|_| named.as_file_mut().flush())
        .map_err(|e| AppError::Io(format!("Failed to write upload: {}", e)))?;

    let (_, path) = named
        .keep()
        .map_err(|e| AppError::Io(format!("Failed to keep upload: {}", e.error)))?;
    Ok(path)
}

async fn store_upload_blocking<F>(
    upload_dir: &Path,
    file_name: &str,
    fill: F,
) -> Result<PathBuf, AppError>
where
    F: FnOnce(&mut File) -> io::Result<()> + Send + 'static,
{
    let dir = upload_dir.to_path_buf();
    let name = file_name.to_string();

    let path = tokio::task::spawn_blocking(move || store_upload(&dir, &name, fill))
        .await
        .map_err(|e| AppError::Internal(format!("Upload write task failed: {}", e)))??;

    tracing::debug!(path = %path.display(), "Upload persisted");
    Ok(path)
}

/// Writes `payload` to a new file under `upload_dir` whose name ends in
/// `_<file_name>`.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory or file cannot be written.
pub async fn persist_upload(
    upload_dir: &Path,
    file_name: &str,
    payload: Vec<u8>,
) -> Result<PathBuf, AppError> {
    store_upload_blocking(upload_dir, file_name, move |file| file.write_all(&payload)).await
}

/// Streams the local file at `source` into a new upload under `upload_dir`.
///
/// # Errors
///
/// Returns `AppError::Io` if `source` cannot be read or the copy cannot be
/// written.
pub async fn copy_upload(
    upload_dir: &Path,
    file_name: &str,
    source: &Path,
) -> Result<PathBuf, AppError> {
    let source = source.to_path_buf();
    store_upload_blocking(upload_dir, file_name, move |file| {
        let mut input = File::open(&source)?;
        io::copy(&mut input, file).map(|_| ())
    })
    .await
}
