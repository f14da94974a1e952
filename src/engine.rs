//! The split engine: source → key resolution → partition writers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::streaming::{ChunkConfig, PartitionKey, PartitionWriteSet, TabularSource};

/// Outcome of one split run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitResult {
    pub keys: BTreeSet<PartitionKey>,
    /// Output file names, relative to the output directory.
    pub files: Vec<String>,
    pub rows_per_key: BTreeMap<PartitionKey, u64>,
    pub units_processed: usize,
    /// Sheets skipped because they lack the key column.
    pub skipped_units: Vec<String>,
}

impl SplitResult {
    /// True when no partition file was produced.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_per_key.values().sum()
    }
}

/// Splits one dataset into per-key files.
#[derive(Debug, Clone, Default)]
pub struct SplitEngine {
    chunk_config: ChunkConfig,
}

impl SplitEngine {
    pub fn new(chunk_config: ChunkConfig) -> Self {
        Self { chunk_config }
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        &self.chunk_config
    }

    /// Splits `source` by `column` into `output_dir`.
    ///
    /// An empty result is returned as `Ok`; callers decide whether it is a
    /// failure. Files written before an error stay on disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ColumnNotFound` when the key column is missing,
    /// `AppError::UnsupportedFileType` for unknown extensions, and I/O class
    /// errors for unreadable sources or unwritable outputs.
    pub fn run(
        &self,
        source: &Path,
        column: &str,
        output_dir: &Path,
    ) -> Result<SplitResult, AppError> {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            AppError::Io(format!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let source_reader = TabularSource::open(source, &self.chunk_config)?;
        let format = source_reader.format();
        let mut writers = PartitionWriteSet::new(output_dir, format);

        tracing::info!(
            source = %source.display(),
            column,
            ?format,
            "Starting split"
        );

        let summary = source_reader.for_each_unit(column, |unit| {
            let groups = unit.rows.partition_by(unit.key_index);
            tracing::debug!(unit = %unit.label, keys = groups.len(), "Processing unit");
            for (key, rows) in groups {
                writers.append(&key, &unit.label, unit.headers, rows)?;
            }
            Ok(())
        })?;

        let result = SplitResult {
            keys: writers.keys().cloned().collect(),
            files: writers.files(),
            rows_per_key: writers.row_counts(),
            units_processed: summary.processed,
            skipped_units: summary.skipped,
        };

        tracing::info!(
            column,
            files = result.files.len(),
            rows = result.total_rows(),
            units = result.units_processed,
            skipped = result.skipped_units.len(),
            "Split complete"
        );

        Ok(result)
    }

    /// Runs [`SplitEngine::run`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`SplitEngine::run`], plus `AppError::Internal` if the
    /// blocking task panics.
    pub async fn run_async(
        &self,
        source: PathBuf,
        column: String,
        output_dir: PathBuf,
    ) -> Result<SplitResult, AppError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.run(&source, &column, &output_dir))
            .await
            .map_err(|e| AppError::Internal(format!("Split task join error: {}", e)))?
    }
}
