//! Uniform access to CSV and spreadsheet sources, one unit at a time.
//!
//! A unit is a bounded window of CSV records or one whole sheet. A missing
//! key column is fatal for CSV but only skips the sheet for spreadsheets,
//! since workbooks often mix schemas across sheets.

use std::path::Path;

use serde::Serialize;

use super::batch::RowBatch;
use super::csv_chunker::{ChunkConfig, CsvChunkReader};
use super::workbook::WorkbookReader;
use crate::error::AppError;

/// Physical format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    /// Detects the format from the file extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnsupportedFileType` for anything but csv, xls or xlsx.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("xlsx") | Some("xls") => Ok(SourceFormat::Spreadsheet),
            _ => Err(AppError::UnsupportedFileType {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
        }
    }

    /// Extension of partition files produced from this format.
    pub fn output_extension(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Spreadsheet => "xlsx",
        }
    }
}

/// One unit of rows handed to the caller.
#[derive(Debug)]
pub struct Unit<'a> {
    /// Chunk index for CSV, sheet name for spreadsheets.
    pub label: String,
    pub headers: &'a [String],
    /// Position of the key column in `headers`.
    pub key_index: usize,
    pub rows: RowBatch,
}

/// What `for_each_unit` visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSummary {
    pub processed: usize,
    /// Labels of sheets skipped because they lack the key column.
    pub skipped: Vec<String>,
}

/// An opened tabular source.
pub enum TabularSource {
    Csv(CsvChunkReader),
    Spreadsheet(WorkbookReader),
}

impl TabularSource {
    /// Opens `path`, choosing the reader from its extension.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnsupportedFileType` for unknown extensions and the
    /// reader's error if the file cannot be opened.
    pub fn open(path: &Path, config: &ChunkConfig) -> Result<Self, AppError> {
        match SourceFormat::from_path(path)? {
            SourceFormat::Csv => Ok(TabularSource::Csv(CsvChunkReader::open(
                path,
                config.clone(),
            )?)),
            SourceFormat::Spreadsheet => Ok(TabularSource::Spreadsheet(WorkbookReader::open(path)?)),
        }
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            TabularSource::Csv(_) => SourceFormat::Csv,
            TabularSource::Spreadsheet(_) => SourceFormat::Spreadsheet,
        }
    }

    /// Calls `f` once per unit that carries `column`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ColumnNotFound` if the CSV header lacks `column` or
    /// no sheet has it, read errors from the underlying reader, and the first
    /// error returned by `f`, which stops the iteration.
    pub fn for_each_unit<F>(self, column: &str, mut f: F) -> Result<UnitSummary, AppError>
    where
        F: FnMut(Unit<'_>) -> Result<(), AppError>,
    {
        let mut summary = UnitSummary::default();

        match self {
            TabularSource::Csv(mut reader) => {
                let headers = reader.headers().to_vec();
                let key_index = headers
                    .iter()
                    .position(|h| h == column)
                    .ok_or_else(|| AppError::ColumnNotFound {
                        column: column.to_string(),
                    })?;

                while let Some(chunk) = reader.next_chunk()? {
                    f(Unit {
                        label: chunk.index.to_string(),
                        headers: &headers,
                        key_index,
                        rows: RowBatch::Csv(chunk.records),
                    })?;
                    summary.processed += 1;
                }
            }
            TabularSource::Spreadsheet(mut workbook) => {
                let names = workbook.sheet_names().to_vec();
                for name in names {
                    let mut sheet = workbook.read_sheet(&name)?;
                    let headers = sheet.header_names();

                    let Some(key_index) = headers.iter().position(|h| h == column) else {
                        tracing::info!(sheet = %name, column, "Sheet lacks key column, skipping");
                        summary.skipped.push(name);
                        continue;
                    };

                    let data_rows = sheet.rows.split_off(1);
                    drop(sheet);

                    f(Unit {
                        label: name,
                        headers: &headers,
                        key_index,
                        rows: RowBatch::Sheet(data_rows),
                    })?;
                    summary.processed += 1;
                }

                if summary.processed == 0 {
                    return Err(AppError::ColumnNotFound {
                        column: column.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}
