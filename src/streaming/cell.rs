//! Typed cell values shared by the CSV and spreadsheet readers.
//!
//! Every cell read from a source is mapped into [`CellValue`] so that key
//! derivation has a single stringification rule regardless of format.

use calamine::{Data, ExcelDateTime};
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Literal used for blank cells when they act as a partition key.
pub const BLANK_KEY: &str = "None";

/// A single cell from a tabular source.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date (1900 date system).
    DateTime(f64),
    Blank,
    /// Cell errors, ISO durations and anything else kept as display text.
    Other(String),
}

impl CellValue {
    /// Maps a raw CSV field. Empty fields become `Blank`.
    pub fn from_csv_field(field: &str) -> Self {
        if field.is_empty() {
            CellValue::Blank
        } else {
            CellValue::Text(field.to_string())
        }
    }

    /// Stringifies the value for use as a partition key.
    pub fn to_key_string(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::Other(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(true) => "True".to_string(),
            CellValue::Bool(false) => "False".to_string(),
            CellValue::DateTime(serial) => match excel_serial_to_datetime(*serial) {
                Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => format_number(*serial),
            },
            CellValue::Blank => BLANK_KEY.to_string(),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::String(s) if s.is_empty() => CellValue::Blank,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateTime(serial_1900(dt)),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Other(s.clone()),
            Data::Error(e) => CellValue::Other(e.to_string()),
            Data::Empty => CellValue::Blank,
        }
    }
}

/// Integral values print without a fractional part so `3.0` keys as `3`.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Serial of `dt` in the 1900 date system. Workbooks using the 1904 system
/// are shifted so keys and re-written cells show the same calendar date.
fn serial_1900(dt: &ExcelDateTime) -> f64 {
    if dt.is_datetime() {
        if let Some(serial) = dt.as_datetime().and_then(datetime_to_excel_serial) {
            return serial;
        }
    }
    dt.as_f64()
}

/// Inverse of [`excel_serial_to_datetime`].
fn datetime_to_excel_serial(ts: NaiveDateTime) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let serial = (ts - epoch).num_milliseconds() as f64 / 86_400_000.0;
    Some(if serial >= 61.0 { serial } else { serial - 1.0 })
}

/// Converts an Excel serial number to a timestamp.
///
/// Serial 60 is the fictitious 1900-02-29; values from 61 on are offset from
/// 1899-12-30, values below from 1899-12-31.
pub(crate) fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if serial >= 61.0 {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis))
}
