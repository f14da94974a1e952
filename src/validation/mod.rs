//! Upload validation before a split job is created.

pub mod upload;

pub use upload::{copy_upload, persist_upload, validate_upload, ValidatedUpload};
