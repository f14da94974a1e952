//! Atomic file writers with automatic cleanup on failure.
//!
//! Writes go to a temporary file in the same directory as the destination,
//! which then atomically replaces the destination. If dropped before
//! finishing, the temporary file is automatically cleaned up.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{Terminator, Writer, WriterBuilder};
use tempfile::NamedTempFile;

use crate::error::AppError;

/// Creates a temporary file next to `final_path`.
fn temp_file_beside(final_path: &Path) -> Result<NamedTempFile, AppError> {
    let parent_dir = final_path
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .ok_or_else(|| {
            AppError::Io(format!(
                "Cannot determine parent directory for: {}",
                final_path.display()
            ))
        })?;

    NamedTempFile::new_in(parent_dir)
        .map_err(|e| AppError::Io(format!("Failed to create temporary file: {}", e)))
}

fn persist(named_temp: NamedTempFile, final_path: &Path) -> Result<(), AppError> {
    named_temp.persist(final_path).map_err(|e| {
        AppError::Io(format!(
            "Failed to persist file to {}: {}",
            final_path.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Atomically replaces `final_path` with `bytes`.
///
/// # Errors
///
/// Returns `AppError::Io` if the temporary file cannot be written or persisted.
pub fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let mut named_temp = temp_file_beside(final_path)?;
    named_temp
        .write_all(bytes)
        .and_then(|_| named_temp.flush())
        .map_err(|e| AppError::Io(format!("Failed to write temporary file: {}", e)))?;
    persist(named_temp, final_path)
}

/// An atomic CSV writer.
///
/// Writes to a temporary file and atomically persists to the final path
/// on `finish()`. If dropped without calling `finish()`, the temporary
/// file is automatically deleted.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    /// Creates a new atomic CSV writer targeting the specified path.
    ///
    /// The temporary file is created in the same directory as `final_path`
    /// to ensure atomic persistence (same filesystem requirement).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the parent directory cannot be determined
    /// or the temporary file cannot be created.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();
        let temp_file = temp_file_beside(&final_path)?;

        Ok(Self {
            writer: csv_writer(BufWriter::new(temp_file)),
            final_path,
        })
    }

    /// Returns a mutable reference to the underlying CSV writer.
    pub fn writer_mut(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flushes all buffers and atomically persists the file to the final path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if flushing or persisting fails. On error, the
    /// temporary file is cleaned up automatically.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let buf_writer = self.writer.into_inner().map_err(|e| {
            AppError::Io(format!("Failed to flush CSV writer: {}", e.error()))
        })?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| AppError::Io(format!("Failed to flush buffer: {}", e.error())))?;

        persist(named_temp, &self.final_path)?;

        Ok(self.final_path)
    }
}

/// CSV writer settings shared by every partition output.
pub(crate) fn csv_writer<W: Write>(inner: W) -> Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_successful_write() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.csv");

        let mut writer = AtomicCsvWriter::new(&final_path).expect("Failed to create writer");
        writer.writer_mut().write_record(["Name", "Age"]).unwrap();
        writer.writer_mut().write_record(["Alice", "30"]).unwrap();
        writer.writer_mut().write_record(["Bob", "25"]).unwrap();

        let result_path = writer.finish().expect("Failed to finish");

        assert_eq!(result_path, final_path);
        let content = fs::read_to_string(&final_path).expect("Failed to read file");
        assert_eq!(content, "Name,Age\nAlice,30\nBob,25\n");
    }

    #[test]
    fn test_drop_cleanup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.csv");

        {
            let mut writer = AtomicCsvWriter::new(&final_path).expect("Failed to create writer");
            writer.writer_mut().write_record(["Header"]).unwrap();
            writer.writer_mut().write_record(["Data"]).unwrap();
            // Dropped without finish()
        }

        let entries_after: Vec<_> = fs::read_dir(temp_dir.path())
            .expect("Failed to read dir")
            .collect();
        assert!(entries_after.is_empty(), "Temp file should be cleaned up");
        assert!(!final_path.exists());
    }

    #[test]
    fn test_write_atomic_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("book.xlsx");

        fs::write(&final_path, "OLD_CONTENT").unwrap();
        write_atomic(&final_path, b"NEW_CONTENT").expect("write_atomic failed");

        assert_eq!(fs::read_to_string(&final_path).unwrap(), "NEW_CONTENT");
        let count = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(count, 1, "No temporary files should remain");
    }

    #[test]
    fn test_invalid_parent_directory() {
        #[cfg(unix)]
        {
            let result = AtomicCsvWriter::new("/");
            assert!(result.is_err(), "Should fail for path with no parent");
        }
    }

    #[test]
    fn test_write_complex_csv_data() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("complex.csv");

        let mut writer = AtomicCsvWriter::new(&final_path).expect("Failed to create writer");
        writer.writer_mut().write_record(["Name", "Description"]).unwrap();
        writer.writer_mut().write_record(["Item1", "Contains, comma"]).unwrap();
        writer.writer_mut().write_record(["Item2", "Multi\nline"]).unwrap();
        writer.finish().expect("Failed to finish");

        let mut reader = csv::Reader::from_path(&final_path).expect("Failed to open reader");
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "Contains, comma");
        assert_eq!(&records[1][1], "Multi\nline");
    }
}
