//! Runtime configuration.
//!
//! Values come from built-in defaults, an optional TOML file, then
//! `COLUMN_SPLITTER__*` environment variables, later sources winning. Nested
//! keys use `__`, e.g. `COLUMN_SPLITTER__LOGGING__LEVEL=debug`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::streaming::ChunkConfig;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "COLUMN_SPLITTER";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Where accepted uploads are persisted.
    pub upload_dir: PathBuf,
    /// Root of the per-job output directories.
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Accepted upload extensions, without the dot.
    pub allowed_extensions: Vec<String>,
    pub csv_chunk_rows: u64,
    pub csv_chunk_bytes: u64,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        let chunk = ChunkConfig::default();
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            archive_dir: PathBuf::from("archives"),
            max_upload_bytes: 50 * MIB,
            allowed_extensions: vec!["csv".into(), "xls".into(), "xlsx".into()],
            csv_chunk_rows: chunk.max_records,
            csv_chunk_bytes: chunk.max_bytes,
            max_concurrent_jobs: 2,
            queue_capacity: 64,
            logging: LoggingConfig::default(),
        }
    }
}

impl SplitterConfig {
    /// Loads configuration from `path` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file is missing or malformed, a value
    /// has the wrong type, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let defaults = config::Config::try_from(&SplitterConfig::default())
            .map_err(|e| AppError::Config(format!("Failed to encode defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_extensions"),
        );

        let loaded: SplitterConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(e.to_string()))?;

        loaded.validate()?;
        tracing::debug!(config = ?loaded, "Configuration loaded");
        Ok(loaded)
    }

    /// Rejects settings the job layer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), AppError> {
        let zero_checks = [
            ("max_concurrent_jobs", self.max_concurrent_jobs as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("csv_chunk_rows", self.csv_chunk_rows),
            ("csv_chunk_bytes", self.csv_chunk_bytes),
            ("max_upload_bytes", self.max_upload_bytes),
        ];
        for (field, value) in zero_checks {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", field)));
            }
        }
        if self.allowed_extensions.is_empty() {
            return Err(AppError::Config("allowed_extensions must not be empty".into()));
        }
        Ok(())
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig::default()
            .max_records(self.csv_chunk_rows)
            .max_bytes(self.csv_chunk_bytes)
    }

    /// Case-insensitive extension check against `allowed_extensions`.
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}
