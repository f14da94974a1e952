//! Record-aware CSV chunking that never corrupts records.
//!
//! Uses the `csv` crate to properly handle embedded commas and newlines within
//! quoted fields. Reads a CSV file lazily in bounded windows of records so that
//! peak memory stays proportional to one chunk regardless of file size.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use crate::error::AppError;

/// Configuration for CSV chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum bytes per chunk (default: 64 MB).
    pub max_bytes: u64,
    /// Maximum records per chunk (excluding header).
    pub max_records: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_records: 10_000,
        }
    }
}

impl ChunkConfig {
    /// Sets the max_bytes limit.
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    /// Sets the max_records limit.
    pub fn max_records(mut self, records: u64) -> Self {
        self.max_records = records;
        self
    }
}

/// One bounded window of records.
#[derive(Debug, Clone)]
pub struct CsvChunk {
    /// Zero-based chunk index.
    pub index: u64,
    pub records: Vec<StringRecord>,
}

/// Lazily reads a CSV file one chunk at a time.
pub struct CsvChunkReader {
    reader: csv::Reader<BufReader<File>>,
    headers: Vec<String>,
    config: ChunkConfig,
    next_index: u64,
    /// Record that did not fit into the previous chunk.
    carry: Option<StringRecord>,
    exhausted: bool,
}

impl CsvChunkReader {
    /// Opens `source` and reads its header row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened and
    /// `AppError::CsvInvalid` if it has no header row.
    pub fn open(source: &Path, config: ChunkConfig) -> Result<Self, AppError> {
        let file = File::open(source)
            .map_err(|e| AppError::Io(format!("Failed to open source file: {}", e)))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::CsvInvalid(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            return Err(AppError::CsvInvalid("CSV file has no header row".to_string()));
        }

        tracing::debug!(
            source = %source.display(),
            columns = headers.len(),
            max_records = config.max_records,
            "Starting CSV chunking"
        );

        Ok(Self {
            reader,
            headers,
            config,
            next_index: 0,
            carry: None,
            exhausted: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Reads the next chunk, or `None` once the file is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CsvInvalid` if a record cannot be parsed.
    pub fn next_chunk(&mut self) -> Result<Option<CsvChunk>, AppError> {
        let mut records: Vec<StringRecord> = Vec::new();
        let mut chunk_bytes: u64 = 0;

        if let Some(record) = self.carry.take() {
            chunk_bytes += record_size(&record);
            records.push(record);
        }

        while !self.exhausted {
            let mut record = StringRecord::new();
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| AppError::CsvInvalid(format!("Failed to read CSV record: {}", e)))?;
            if !more {
                self.exhausted = true;
                break;
            }

            let size = record_size(&record);
            if would_exceed_limits(chunk_bytes, records.len() as u64, size, &self.config) {
                self.carry = Some(record);
                break;
            }
            chunk_bytes += size;
            records.push(record);
        }

        if records.is_empty() {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;

        tracing::trace!(chunk_index = index, rows = records.len(), bytes = chunk_bytes, "Read chunk");

        Ok(Some(CsvChunk { index, records }))
    }
}

/// Serialized size of a record: field bytes, separators and terminator.
fn record_size(record: &StringRecord) -> u64 {
    (record.as_slice().len() + record.len().max(1)) as u64
}

/// Checks if adding a record would exceed the configured limits.
fn would_exceed_limits(
    current_bytes: u64,
    current_rows: u64,
    record_size: u64,
    config: &ChunkConfig,
) -> bool {
    // A single oversize record still forms its own chunk
    if current_rows == 0 {
        return false;
    }

    if current_rows >= config.max_records {
        return true;
    }

    current_bytes + record_size > config.max_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper to create a test CSV file and return its path.
    fn create_test_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("test.csv");
        fs::write(&path, content).expect("Failed to write test CSV");
        path
    }

    fn drain(reader: &mut CsvChunkReader) -> Vec<CsvChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().expect("next_chunk failed") {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_embedded_newline_integrity() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "Name,Desc\n\"John\",\"Line1\nLine2\"\n");

        let mut reader = CsvChunkReader::open(&source, ChunkConfig::default().max_records(1))
            .expect("open failed");
        let chunks = drain(&mut reader);

        assert_eq!(chunks.len(), 1);
        assert_eq!(reader.headers(), ["Name", "Desc"]);
        assert_eq!(&chunks[0].records[0][1], "Line1\nLine2");
    }

    #[test]
    fn test_embedded_comma_integrity() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "Name,Address\n\"John\",\"123 Main St, Apt 4\"\n");

        let mut reader = CsvChunkReader::open(&source, ChunkConfig::default()).unwrap();
        let chunks = drain(&mut reader);
        assert_eq!(&chunks[0].records[0][1], "123 Main St, Apt 4");
    }

    #[test]
    fn test_record_limit() {
        // 5 rows with max 2 records per chunk = [2, 2, 1]
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "Id,Name\n1,A\n2,B\n3,C\n4,D\n5,E\n");

        let mut reader =
            CsvChunkReader::open(&source, ChunkConfig::default().max_records(2)).unwrap();
        let chunks = drain(&mut reader);

        let sizes: Vec<usize> = chunks.iter().map(|c| c.records.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let indexes: Vec<u64> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_byte_limit() {
        let dir = TempDir::new().unwrap();
        let long = "A".repeat(40);
        let source = create_test_csv(
            &dir,
            &format!("Id,LongField\n1,{long}\n2,{long}\n3,{long}\n"),
        );

        // Each record is ~44 bytes, so 60 bytes fits exactly one
        let config = ChunkConfig::default().max_bytes(60).max_records(1000);
        let mut reader = CsvChunkReader::open(&source, config).unwrap();
        let chunks = drain(&mut reader);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.records.len() == 1));
    }

    #[test]
    fn test_large_record_policy() {
        let dir = TempDir::new().unwrap();
        let long_value = "X".repeat(80);
        let source = create_test_csv(&dir, &format!("Id,Data\n1,{long_value}\n2,short\n"));

        let config = ChunkConfig::default().max_bytes(20).max_records(1000);
        let mut reader = CsvChunkReader::open(&source, config).unwrap();
        let chunks = drain(&mut reader);

        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].records[0][1], long_value.as_str());
    }

    #[test]
    fn test_header_only_yields_no_chunks() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "Id,Name\n");

        let mut reader = CsvChunkReader::open(&source, ChunkConfig::default()).unwrap();
        assert_eq!(reader.headers(), ["Id", "Name"]);
        assert!(reader.next_chunk().unwrap().is_none());
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_no_header_returns_error() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "");

        match CsvChunkReader::open(&source, ChunkConfig::default()) {
            Err(AppError::CsvInvalid(msg)) => assert!(msg.contains("header")),
            Err(other) => panic!("Expected CsvInvalid, got {other:?}"),
            Ok(_) => panic!("Expected CsvInvalid, got a reader"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = CsvChunkReader::open(&dir.path().join("missing.csv"), ChunkConfig::default());
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn test_chunk_config_builder() {
        let config = ChunkConfig::default();
        assert_eq!(config.max_records, 10_000);
        assert_eq!(config.max_bytes, 64 * 1024 * 1024);

        let config = config.max_records(200).max_bytes(50 * 1024 * 1024);
        assert_eq!(config.max_records, 200);
        assert_eq!(config.max_bytes, 50 * 1024 * 1024);
    }
}
