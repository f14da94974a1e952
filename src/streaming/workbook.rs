//! Spreadsheet reading and writing.
//!
//! Reading goes through `calamine` (xlsx and legacy xls), writing through
//! `rust_xlsxwriter`. A whole sheet is materialized in memory; the workbook
//! format offers no row-streaming alternative.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use super::atomic_writer::write_atomic;
use super::cell::CellValue;
use crate::error::AppError;

/// Longest sheet name the xlsx format accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// One sheet held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    /// Zero-based (row, column) of the first cell in `rows`.
    pub origin: (u32, u32),
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    /// A sheet starting at A1.
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            origin: (0, 0),
            rows,
        }
    }

    /// Header names from the first row. Blank headers are named `Unnamed: N`.
    pub fn header_names(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| match cell {
                        CellValue::Blank => format!("Unnamed: {}", idx),
                        other => other.to_key_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Truncates a sheet name to the format's limit (counted in characters).
pub fn truncate_sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

fn spreadsheet_err(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Spreadsheet(format!("{}: {}", context, e))
}

/// Sheet-by-sheet reader over an xlsx or xls workbook.
pub struct WorkbookReader {
    workbook: Sheets<BufReader<File>>,
    sheet_names: Vec<String>,
}

impl WorkbookReader {
    /// Opens a workbook, detecting the format from the extension.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spreadsheet` if the file is not a readable workbook.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let workbook = open_workbook_auto(path)
            .map_err(|e| spreadsheet_err("Failed to open workbook", e))?;
        let sheet_names = workbook.sheet_names();
        Ok(Self {
            workbook,
            sheet_names,
        })
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Loads one sheet fully into memory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spreadsheet` if the sheet cannot be decoded.
    pub fn read_sheet(&mut self, name: &str) -> Result<SheetData, AppError> {
        let range = self
            .workbook
            .worksheet_range(name)
            .map_err(|e| spreadsheet_err(&format!("Failed to read sheet '{}'", name), e))?;

        let origin = range.start().unwrap_or((0, 0));
        let rows = range
            .rows()
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();

        Ok(SheetData {
            name: name.to_string(),
            origin,
            rows,
        })
    }

    /// Loads every sheet, in workbook order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spreadsheet` if any sheet cannot be decoded.
    pub fn read_all(mut self) -> Result<Vec<SheetData>, AppError> {
        let names = self.sheet_names.clone();
        names.iter().map(|name| self.read_sheet(name)).collect()
    }
}

/// Writes `sheets` as a new xlsx workbook, atomically replacing `path`.
///
/// # Errors
///
/// Returns `AppError::Spreadsheet` for invalid sheet names or cell positions,
/// `AppError::Io` if the file cannot be persisted.
pub fn write_workbook(path: &Path, sheets: &[SheetData]) -> Result<(), AppError> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet.name)
            .map_err(|e| spreadsheet_err(&format!("Invalid sheet name '{}'", sheet.name), e))?;

        for (r, row) in sheet.rows.iter().enumerate() {
            let row_idx = sheet.origin.0 + r as u32;
            for (c, cell) in row.iter().enumerate() {
                let col_idx = u16::try_from(sheet.origin.1 as usize + c)
                    .map_err(|_| spreadsheet_err("Column out of range", c))?;
                let written: Result<_, XlsxError> = match cell {
                    CellValue::Text(s) | CellValue::Other(s) => {
                        worksheet.write_string(row_idx, col_idx, s)
                    }
                    CellValue::Number(n) => worksheet.write_number(row_idx, col_idx, *n),
                    CellValue::Bool(b) => worksheet.write_boolean(row_idx, col_idx, *b),
                    CellValue::DateTime(serial) => {
                        worksheet.write_number_with_format(row_idx, col_idx, *serial, &date_format)
                    }
                    CellValue::Blank => continue,
                };
                written.map_err(|e| spreadsheet_err("Failed to write cell", e))?;
            }
        }
    }

    let buffer = workbook
        .save_to_buffer()
        .map_err(|e| spreadsheet_err("Failed to encode workbook", e))?;
    write_atomic(path, &buffer)
}

/// Reads every sheet of an existing xlsx file.
///
/// # Errors
///
/// Returns `AppError::Spreadsheet` if the file is not a readable workbook.
pub fn read_workbook(path: &Path) -> Result<Vec<SheetData>, AppError> {
    WorkbookReader::open(path)?.read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_truncate_sheet_name() {
        let long = "A".repeat(40);
        assert_eq!(truncate_sheet_name(&long).len(), MAX_SHEET_NAME_LEN);
        assert_eq!(truncate_sheet_name("Jan"), "Jan");
        // Multi-byte characters count as one
        let accented = "é".repeat(40);
        assert_eq!(truncate_sheet_name(&accented).chars().count(), MAX_SHEET_NAME_LEN);
    }

    #[test]
    fn test_header_names() {
        let sheet = SheetData::new(
            "Data",
            vec![vec![text("Region"), CellValue::Blank, CellValue::Number(2024.0)]],
        );
        assert_eq!(sheet.header_names(), vec!["Region", "Unnamed: 1", "2024"]);
    }

    #[test]
    fn test_write_then_read_preserves_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("East.xlsx");

        let sheets = vec![
            SheetData::new(
                "Jan",
                vec![
                    vec![text("Region"), text("Amount"), text("Paid")],
                    vec![text("East"), CellValue::Number(12.5), CellValue::Bool(true)],
                ],
            ),
            SheetData::new(
                "Feb",
                vec![
                    vec![text("Region"), text("Amount"), text("Paid")],
                    vec![text("East"), CellValue::Number(3.0), CellValue::Bool(false)],
                ],
            ),
        ];
        write_workbook(&path, &sheets).expect("write failed");

        let read = read_workbook(&path).expect("read failed");
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name, "Jan");
        assert_eq!(read[1].name, "Feb");
        assert_eq!(read[0].rows[1][0], text("East"));
        assert_eq!(read[0].rows[1][1], CellValue::Number(12.5));
        assert_eq!(read[1].rows[1][2], CellValue::Bool(false));
    }

    #[test]
    fn test_date_cells_round_trip_as_dates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dates.xlsx");

        let sheets = vec![SheetData::new(
            "S",
            vec![vec![text("When")], vec![CellValue::DateTime(45292.0)]],
        )];
        write_workbook(&path, &sheets).unwrap();

        let read = read_workbook(&path).unwrap();
        assert_eq!(read[0].rows[1][0].to_key_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_open_rejects_non_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();

        assert!(matches!(WorkbookReader::open(&path), Err(AppError::Spreadsheet(_))));
    }
}
