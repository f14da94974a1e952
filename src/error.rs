use serde::Serialize;
use thiserror::Error;

/// Coarse error classes exposed at the status boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected at submission, no job was created.
    Validation,
    /// The key column is missing from the source.
    Schema,
    /// The split ran but produced no partition files.
    EmptyResult,
    /// Disk, permission or corrupt-source failures.
    Io,
    /// Anything else (configuration, join failures).
    Internal,
}

/// User-friendly error presentation for callers polling a job.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Validation ────────────────────────────────────────────────────────────
    #[error("No column name given")]
    MissingColumnName,

    #[error("Unsupported file type: {file_name}")]
    UnsupportedFileType { file_name: String },

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Split queue is full")]
    QueueFull,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} has not finished yet")]
    JobNotFinished(String),

    // ── Schema ────────────────────────────────────────────────────────────────
    #[error("Column '{column}' not found")]
    ColumnNotFound { column: String },

    // ── Empty result ──────────────────────────────────────────────────────────
    #[error("No data found for column '{column}'")]
    EmptyResult { column: String },

    // ── File / IO ─────────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Archive error: {0}")]
    Archive(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error class used by the status boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingColumnName
            | AppError::UnsupportedFileType { .. }
            | AppError::EmptyUpload
            | AppError::PayloadTooLarge { .. }
            | AppError::QueueFull
            | AppError::JobNotFound(_)
            | AppError::JobNotFinished(_) => ErrorKind::Validation,
            AppError::ColumnNotFound { .. } => ErrorKind::Schema,
            AppError::EmptyResult { .. } => ErrorKind::EmptyResult,
            AppError::Io(_)
            | AppError::CsvInvalid(_)
            | AppError::Spreadsheet(_)
            | AppError::Archive(_) => ErrorKind::Io,
            AppError::Config(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Converts the error into a presentation suitable for display.
    /// Internal failures never expose their detail; it is logged instead.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Validation ────────────────────────────────────────────────────
            AppError::MissingColumnName => ErrorPresentation {
                title: "Column Required".into(),
                message: "Please enter a column name.".into(),
                action: Some("Enter the column to split by".into()),
            },

            AppError::UnsupportedFileType { .. } => ErrorPresentation {
                title: "Invalid File Type".into(),
                message: "Please upload Excel (.xlsx, .xls) or CSV (.csv) files only.".into(),
                action: Some("Choose a CSV or Excel file".into()),
            },

            AppError::EmptyUpload => ErrorPresentation {
                title: "No File Selected".into(),
                message: "The uploaded file is empty.".into(),
                action: Some("Select a file and try again".into()),
            },

            AppError::PayloadTooLarge { limit, .. } => ErrorPresentation {
                title: "File Too Large".into(),
                message: format!(
                    "The file exceeds the maximum upload size of {} MB.",
                    limit / (1024 * 1024)
                ),
                action: Some("Upload a smaller file".into()),
            },

            AppError::QueueFull => ErrorPresentation {
                title: "Server Busy".into(),
                message: "Too many files are being split right now.".into(),
                action: Some("Wait a moment and retry".into()),
            },

            AppError::JobNotFound(_) => ErrorPresentation {
                title: "Unknown Job".into(),
                message: "No split job exists with that id. It may have been cleaned up.".into(),
                action: Some("Submit the file again".into()),
            },

            AppError::JobNotFinished(_) => ErrorPresentation {
                title: "Still Processing".into(),
                message: "The split is still running.".into(),
                action: Some("Check back shortly".into()),
            },

            // ── Schema ────────────────────────────────────────────────────────
            AppError::ColumnNotFound { column } => ErrorPresentation {
                title: "Column Not Found".into(),
                message: format!("Column '{}' not found in the uploaded file.", column),
                action: Some("Check the column name and try again".into()),
            },

            // ── Empty result ──────────────────────────────────────────────────
            AppError::EmptyResult { column } => ErrorPresentation {
                title: "Nothing to Split".into(),
                message: format!("No data found for column \"{}\".", column),
                action: None,
            },

            // ── File / IO ─────────────────────────────────────────────────────
            AppError::Io(msg) => ErrorPresentation {
                title: "File Error".into(),
                message: format!("A file could not be read or written: {}", msg),
                action: Some("Try again".into()),
            },

            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            AppError::Spreadsheet(msg) => ErrorPresentation {
                title: "Spreadsheet Error".into(),
                message: format!("Error processing file: {}", msg),
                action: Some("Check that the workbook opens correctly".into()),
            },

            AppError::Archive(msg) => ErrorPresentation {
                title: "Archive Error".into(),
                message: format!("The split files could not be archived: {}", msg),
                action: Some("Try again".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Config(_) | AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::CsvInvalid(e.to_string())
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns all AppError variants for exhaustive testing.
    fn all_variants() -> Vec<AppError> {
        vec![
            AppError::MissingColumnName,
            AppError::UnsupportedFileType { file_name: "notes.txt".into() },
            AppError::EmptyUpload,
            AppError::PayloadTooLarge { size: 60 * 1024 * 1024, limit: 50 * 1024 * 1024 },
            AppError::QueueFull,
            AppError::JobNotFound("20260101_000000_000-deadbeef".into()),
            AppError::JobNotFinished("20260101_000000_000-deadbeef".into()),
            AppError::ColumnNotFound { column: "Region".into() },
            AppError::EmptyResult { column: "Region".into() },
            AppError::Io("disk full".into()),
            AppError::CsvInvalid("unequal lengths".into()),
            AppError::Spreadsheet("bad zip".into()),
            AppError::Archive("cannot write".into()),
            AppError::Config("bad value".into()),
            AppError::Internal("join error".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_title_and_message() {
        for variant in all_variants() {
            let presentation = variant.to_presentation();
            assert!(!presentation.title.trim().is_empty(), "Empty title for {:?}", variant);
            assert!(!presentation.message.trim().is_empty(), "Empty message for {:?}", variant);
        }
    }

    #[test]
    fn schema_error_names_the_column() {
        let err = AppError::ColumnNotFound { column: "Region".into() };
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("Region"));
        assert!(err.to_presentation().message.contains("Region"));
    }

    #[test]
    fn empty_result_is_distinct_from_schema() {
        let empty = AppError::EmptyResult { column: "Region".into() };
        let schema = AppError::ColumnNotFound { column: "Region".into() };
        assert_eq!(empty.kind(), ErrorKind::EmptyResult);
        assert_ne!(empty.kind(), schema.kind());
    }

    #[test]
    fn io_errors_preserve_cause() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_presentation().message.contains("disk full"));
    }

    #[test]
    fn internal_errors_hide_detail() {
        let presentation = AppError::Internal("panicked at src/engine.rs:42".into()).to_presentation();
        assert!(!presentation.message.contains("engine.rs"));
    }

    #[test]
    fn serialization_produces_valid_json_with_required_fields() {
        for variant in all_variants() {
            let json = serde_json::to_string(&variant)
                .unwrap_or_else(|_| panic!("Failed to serialize {:?}", variant));
            let parsed: serde_json::Value = serde_json::from_str(&json)
                .unwrap_or_else(|_| panic!("Failed to parse JSON for {:?}", variant));

            assert!(parsed.get("title").is_some(), "{:?} missing 'title'", variant);
            assert!(parsed.get("message").is_some(), "{:?} missing 'message'", variant);
            assert!(parsed.get("action").is_some(), "{:?} missing 'action'", variant);
        }
    }
}
