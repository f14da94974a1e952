//! Row batches and per-key grouping.

use std::collections::BTreeMap;

use csv::StringRecord;

use super::cell::CellValue;
use super::partition_key::PartitionKey;

/// Rows of one unit, in the representation of their source format.
#[derive(Debug, Clone, PartialEq)]
pub enum RowBatch {
    /// CSV records, written back verbatim.
    Csv(Vec<StringRecord>),
    /// Spreadsheet rows of typed cells.
    Sheet(Vec<Vec<CellValue>>),
}

impl RowBatch {
    pub fn len(&self) -> usize {
        match self {
            RowBatch::Csv(records) => records.len(),
            RowBatch::Sheet(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups rows by the partition key of column `key_index`.
    ///
    /// Rows keep their input order within each group. Rows too short to
    /// have the column key as blank.
    pub fn partition_by(self, key_index: usize) -> BTreeMap<PartitionKey, RowBatch> {
        match self {
            RowBatch::Csv(records) => {
                let mut groups: BTreeMap<PartitionKey, Vec<StringRecord>> = BTreeMap::new();
                for record in records {
                    let value = CellValue::from_csv_field(record.get(key_index).unwrap_or(""));
                    groups
                        .entry(PartitionKey::resolve(&value))
                        .or_default()
                        .push(record);
                }
                groups
                    .into_iter()
                    .map(|(key, rows)| (key, RowBatch::Csv(rows)))
                    .collect()
            }
            RowBatch::Sheet(rows) => {
                let mut groups: BTreeMap<PartitionKey, Vec<Vec<CellValue>>> = BTreeMap::new();
                for row in rows {
                    let key = row
                        .get(key_index)
                        .map(PartitionKey::resolve)
                        .unwrap_or_else(|| PartitionKey::resolve(&CellValue::Blank));
                    groups.entry(key).or_default().push(row);
                }
                groups
                    .into_iter()
                    .map(|(key, rows)| (key, RowBatch::Sheet(rows)))
                    .collect()
            }
        }
    }
}
