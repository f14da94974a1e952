//! Streaming utilities for partitioning large tabular files.
//!
//! This module provides record-aware CSV chunking that preserves data integrity
//! even when fields contain embedded commas and newlines inside quotes,
//! sheet-by-sheet spreadsheet access, partition key derivation, and the
//! per-key output writers with atomic file replacement.

mod atomic_writer;
mod batch;
pub mod cell;
mod csv_chunker;
mod partition_key;
mod partition_writer;
mod source;
pub mod workbook;

pub use batch::RowBatch;
pub use cell::CellValue;
pub use csv_chunker::ChunkConfig;
pub use partition_key::PartitionKey;
pub use partition_writer::PartitionWriteSet;
pub use source::{SourceFormat, TabularSource, Unit, UnitSummary};
