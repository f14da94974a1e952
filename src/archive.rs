//! Zip archiving of a job's output directory.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AppError;

/// Name offered to the caller when downloading an archive.
pub const DOWNLOAD_NAME: &str = "split_files.zip";

/// File name of the archive for a job.
pub fn archive_file_name(job_id: &str) -> String {
    format!("split_files_{}.zip", job_id)
}

/// Bundles output directories into zip files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Archiver;

impl Archiver {
    /// Writes every regular file directly inside `dir` into a new zip at
    /// `archive_path`, one top-level entry per file, sorted by name.
    ///
    /// The archive is built in a temp file beside `archive_path` and renamed
    /// into place, so a partial archive is never visible.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `dir` cannot be listed or a file cannot be
    /// read, and `AppError::Archive` if the zip cannot be written.
    pub fn archive_dir(&self, dir: &Path, archive_path: &Path) -> Result<PathBuf, AppError> {
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        let entries = fs::read_dir(dir).map_err(|e| {
            AppError::Io(format!("Failed to list {}: {}", dir.display(), e))
        })?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let parent = archive_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| AppError::Io(format!("Failed to create temp file: {}", e)))?;
        let mut zip = ZipWriter::new(temp);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, path) in &files {
            zip.start_file(name.as_str(), options)
                .map_err(|e| AppError::Archive(format!("{}: {}", name, e)))?;
            let mut reader = BufReader::new(File::open(path)?);
            io::copy(&mut reader, &mut zip)
                .map_err(|e| AppError::Archive(format!("{}: {}", name, e)))?;
        }

        let temp = zip
            .finish()
            .map_err(|e| AppError::Archive(format!("Failed to finish archive: {}", e)))?;
        temp.persist(archive_path).map_err(|e| {
            AppError::Io(format!(
                "Failed to persist {}: {}",
                archive_path.display(),
                e.error
            ))
        })?;

        tracing::debug!(
            archive = %archive_path.display(),
            entries = files.len(),
            "Archive written"
        );

        Ok(archive_path.to_path_buf())
    }
}
