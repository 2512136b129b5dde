//! In-memory union of verified partitions
//!
//! Grows monotonically: each partition's rows are appended once, as one
//! contiguous run, and never removed.

use crate::record::{abbreviate, PartitionKey, Record};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::ops::Range;

/// Rows from every partition loaded so far
#[derive(Debug, Clone, Default)]
pub struct AccumulatedTable {
    rows: Vec<Record>,
    /// code_abbr -> row index
    by_abbr: AHashMap<String, usize>,
    partitions: BTreeMap<PartitionKey, Range<usize>>,
}

impl AccumulatedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a partition's records; returns false if it was already merged
    pub(crate) fn merge(&mut self, key: PartitionKey, records: Vec<Record>) -> bool {
        if self.partitions.contains_key(&key) {
            return false;
        }

        let start = self.rows.len();
        self.by_abbr.reserve(records.len());
        for (offset, record) in records.iter().enumerate() {
            self.by_abbr.insert(record.code_abbr().to_string(), start + offset);
        }
        self.rows.extend(records);
        self.partitions.insert(key, start..self.rows.len());
        true
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in merge order
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter()
    }

    pub fn contains_partition(&self, key: PartitionKey) -> bool {
        self.partitions.contains_key(&key)
    }

    /// Merged partitions, alphabetically
    pub fn loaded_partitions(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.partitions.keys().copied()
    }

    /// Rows of one merged partition
    pub fn partition(&self, key: PartitionKey) -> Option<&[Record]> {
        self.partitions.get(&key).map(|range| &self.rows[range.clone()])
    }

    /// Find a record by postcode, ignoring spacing and case
    pub fn get(&self, code: &str) -> Option<&Record> {
        self.by_abbr.get(&abbreviate(code)).map(|&idx| &self.rows[idx])
    }

    /// Records whose abbreviated code starts with the abbreviated prefix
    ///
    /// Only the partition of the prefix's first letter is scanned.
    pub fn search(&self, prefix: &str) -> Vec<&Record> {
        let prefix = abbreviate(prefix);
        let Some(first) = prefix.chars().next() else {
            return Vec::new();
        };
        let Ok(key) = PartitionKey::from_char(first) else {
            return Vec::new();
        };

        self.partition(key)
            .unwrap_or_default()
            .iter()
            .filter(|r| r.code_abbr().starts_with(&prefix))
            .collect()
    }
}
