//! Incremental per-key output files.
//!
//! Each partition key owns one output file in the run's output directory.
//! The first append creates it (CSV: header + rows, xlsx: a workbook with one
//! sheet); later appends extend it (CSV: rows only, in append mode; xlsx: add
//! or replace the sheet named after the unit). No file handle survives an
//! append, so every file on disk is complete between calls.
//!
//! File names are compared case-insensitively. Keys such as `US` and `us`
//! would name the same file on macOS and Windows, so the later key writes
//! into the file of the first one on every platform.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::PathBuf;

use csv::StringRecord;

use super::atomic_writer::{csv_writer, AtomicCsvWriter};
use super::batch::RowBatch;
use super::cell::CellValue;
use super::partition_key::PartitionKey;
use super::source::SourceFormat;
use super::workbook::{read_workbook, truncate_sheet_name, write_workbook, SheetData};
use crate::error::AppError;

/// Per-file output state.
#[derive(Debug, Clone)]
struct PartitionWriter {
    path: PathBuf,
    file_name: String,
    /// Whether the output file exists for this run.
    created: bool,
    rows_written: u64,
    /// Unit label and key of the most recent append.
    last_write: Option<(String, PartitionKey)>,
}

/// The set of partition outputs for one split run.
#[derive(Debug)]
pub struct PartitionWriteSet {
    output_dir: PathBuf,
    format: SourceFormat,
    /// Keyed by the key that first claimed the file.
    writers: BTreeMap<PartitionKey, PartitionWriter>,
    /// Lowercased file name to the key owning that file.
    owners: HashMap<String, PartitionKey>,
}

impl PartitionWriteSet {
    pub fn new(output_dir: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
            writers: BTreeMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Appends `rows` of unit `unit_label` to the output for `key`.
    ///
    /// An empty batch is a no-op and never creates a file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` or `AppError::Spreadsheet` if the output cannot
    /// be written, and `AppError::Internal` if the batch does not match the
    /// output format.
    pub fn append(
        &mut self,
        key: &PartitionKey,
        unit_label: &str,
        headers: &[String],
        rows: RowBatch,
    ) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let file_name = key.file_name(self.format.output_extension());
        let owner = self
            .owners
            .entry(file_name.to_lowercase())
            .or_insert_with(|| key.clone())
            .clone();
        if owner != *key {
            tracing::debug!(key = %key, owner = %owner, "Key shares its output file");
        }

        let output_dir = &self.output_dir;
        let writer = self.writers.entry(owner).or_insert_with(|| PartitionWriter {
            path: output_dir.join(&file_name),
            file_name,
            created: false,
            rows_written: 0,
            last_write: None,
        });

        let row_count = rows.len() as u64;
        match (self.format, rows) {
            (SourceFormat::Csv, RowBatch::Csv(records)) => append_csv(writer, headers, &records)?,
            (SourceFormat::Spreadsheet, RowBatch::Sheet(rows)) => {
                append_sheet(writer, key, unit_label, headers, rows)?
            }
            (format, _) => {
                return Err(AppError::Internal(format!(
                    "Row batch does not match {:?} output",
                    format
                )))
            }
        }

        tracing::trace!(key = %key, unit = unit_label, rows = row_count, "Appended partition rows");

        writer.created = true;
        writer.rows_written += row_count;
        writer.last_write = Some((unit_label.to_string(), key.clone()));
        Ok(())
    }

    /// Keys owning an output file.
    pub fn keys(&self) -> impl Iterator<Item = &PartitionKey> {
        self.writers.iter().filter(|(_, w)| w.created).map(|(k, _)| k)
    }

    /// Output file names, sorted by key.
    pub fn files(&self) -> Vec<String> {
        self.writers
            .values()
            .filter(|w| w.created)
            .map(|w| w.file_name.clone())
            .collect()
    }

    /// Rows written per output file, keyed by the owning key.
    pub fn row_counts(&self) -> BTreeMap<PartitionKey, u64> {
        self.writers
            .iter()
            .filter(|(_, w)| w.created)
            .map(|(k, w)| (k.clone(), w.rows_written))
            .collect()
    }
}

fn write_err(file_name: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Io(format!("Failed to write {}: {}", file_name, e))
}

fn append_csv(
    writer: &PartitionWriter,
    headers: &[String],
    records: &[StringRecord],
) -> Result<(), AppError> {
    if !writer.created {
        let mut out = AtomicCsvWriter::new(&writer.path)?;
        out.writer_mut()
            .write_record(headers)
            .map_err(|e| write_err(&writer.file_name, e))?;
        for record in records {
            out.writer_mut()
                .write_record(record)
                .map_err(|e| write_err(&writer.file_name, e))?;
        }
        out.finish()?;
        return Ok(());
    }

    let file = OpenOptions::new()
        .append(true)
        .open(&writer.path)
        .map_err(|e| write_err(&writer.file_name, e))?;
    let mut out = csv_writer(BufWriter::new(file));
    for record in records {
        out.write_record(record)
            .map_err(|e| write_err(&writer.file_name, e))?;
    }
    out.flush().map_err(|e| write_err(&writer.file_name, e))?;
    Ok(())
}

fn append_sheet(
    writer: &PartitionWriter,
    key: &PartitionKey,
    unit_label: &str,
    headers: &[String],
    rows: Vec<Vec<CellValue>>,
) -> Result<(), AppError> {
    let name = truncate_sheet_name(unit_label);
    let mut sheets = if writer.created {
        read_workbook(&writer.path)?
    } else {
        Vec::new()
    };

    // Another key sharing this file already wrote this unit
    let merge = matches!(
        &writer.last_write,
        Some((unit, last_key)) if unit == unit_label && last_key != key
    );

    // Sheet names are case-insensitive in xlsx
    let wanted = name.to_lowercase();
    match sheets.iter_mut().find(|s| s.name.to_lowercase() == wanted) {
        Some(existing) if merge => existing.rows.extend(rows),
        Some(existing) => *existing = SheetData::new(name, with_header(headers, rows)),
        None => sheets.push(SheetData::new(name, with_header(headers, rows))),
    }

    write_workbook(&writer.path, &sheets)
}

fn with_header(headers: &[String], rows: Vec<Vec<CellValue>>) -> Vec<Vec<CellValue>> {
    let mut sheet_rows = Vec::with_capacity(rows.len() + 1);
    sheet_rows.push(headers.iter().map(|h| CellValue::Text(h.clone())).collect());
    sheet_rows.extend(rows);
    sheet_rows
}
