//! Offline dataset generation
//!
//! Source rows -> per-letter partitions -> encoded partition files -> manifest.
//! All-or-nothing: any invalid row or encoding failure aborts the whole run,
//! so a manifest is never built over an incomplete set of files.

use crate::codec::{ColumnarCodec, PartitionCodec};
use crate::config::GeneratorConfig;
use crate::error::{GenerateError, ManifestError, SchemaError, SigningError};
use crate::manifest::Manifest;
use crate::record::{PartitionKey, Record, SourceRow};
use crate::signing::{sign, ManifestSignature};
use ahash::AHashSet;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Partitions and encodes source rows
pub struct Generator {
    codec: Box<dyn PartitionCodec>,
}

impl Generator {
    /// Generator using the default codec (columnar + zstd)
    pub fn new() -> Self {
        Self::with_codec(ColumnarCodec::default())
    }

    pub fn with_codec<C: PartitionCodec + 'static>(codec: C) -> Self {
        Generator {
            codec: Box::new(codec),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::with_codec(ColumnarCodec::new(config.compression, config.level))
    }

    /// Partition, validate and encode rows
    ///
    /// Row order within a partition follows source order. Letters with no
    /// rows produce no partition and no manifest entry.
    ///
    /// # Errors
    ///
    /// - `GenerateError::Schema` for an invalid or duplicate code
    /// - `GenerateError::Codec` if a partition fails to encode
    ///
    /// # Examples
    ///
    /// ```
    /// use postcode_pack::{Generator, SourceRow};
    ///
    /// let dataset = Generator::new()
    ///     .generate(vec![
    ///         SourceRow::new("AB1 2CD", 394251, 806376, "S12000033"),
    ///         SourceRow::new("AZ9 8ZZ", 1, 2, "X"),
    ///         SourceRow::new("BB1 1AA", 367684, 428284, "E06000008"),
    ///     ])
    ///     .unwrap();
    ///
    /// assert_eq!(dataset.manifest().len(), 2);
    /// assert_eq!(dataset.total_records(), 3);
    /// ```
    pub fn generate<I>(&self, rows: I) -> Result<GeneratedDataset, GenerateError>
    where
        I: IntoIterator<Item = SourceRow>,
    {
        let mut grouped: BTreeMap<PartitionKey, Vec<Record>> = BTreeMap::new();
        let mut seen = AHashSet::new();

        for row in rows {
            let record = row.into_record()?;
            if !seen.insert(record.code_abbr().to_string()) {
                return Err(SchemaError::DuplicateCode(record.code().to_string()).into());
            }
            grouped.entry(record.partition_key()).or_default().push(record);
        }

        let mut partitions = BTreeMap::new();
        let mut record_counts = BTreeMap::new();

        for (key, records) in grouped {
            let bytes = self
                .codec
                .encode(&records)
                .map_err(|source| GenerateError::Codec { key, source })?;

            debug!(
                "Partition {}: {} rows, {} bytes ({})",
                key,
                records.len(),
                bytes.len(),
                self.codec.name()
            );

            record_counts.insert(key, records.len());
            partitions.insert(key, bytes);
        }

        let manifest = Manifest::build(partitions.iter().map(|(k, v)| (*k, v.as_slice())))?;

        let dataset = GeneratedDataset {
            partitions,
            record_counts,
            manifest,
        };

        info!(
            "Generated {} partitions: {} rows, {} bytes",
            dataset.manifest.len(),
            dataset.total_records(),
            dataset.manifest.total_bytes()
        );

        Ok(dataset)
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of one generation run
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    partitions: BTreeMap<PartitionKey, Vec<u8>>,
    record_counts: BTreeMap<PartitionKey, usize>,
    manifest: Manifest,
}

impl GeneratedDataset {
    /// Encoded partition files, alphabetically
    pub fn partitions(&self) -> impl Iterator<Item = (PartitionKey, &[u8])> + '_ {
        self.partitions.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn partition(&self, key: PartitionKey) -> Option<&[u8]> {
        self.partitions.get(&key).map(Vec::as_slice)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Canonical manifest bytes, as published and signed
    pub fn manifest_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        self.manifest.canonical_bytes()
    }

    /// Rows in one partition (0 if the letter had none)
    pub fn record_count(&self, key: PartitionKey) -> usize {
        self.record_counts.get(&key).copied().unwrap_or(0)
    }

    pub fn total_records(&self) -> usize {
        self.record_counts.values().sum()
    }

    /// Sign the manifest's canonical bytes
    pub fn sign(&self, private_key: &[u8]) -> Result<ManifestSignature, SigningError> {
        let canonical = self.manifest_bytes()?;
        sign(&canonical, private_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, CompressionMethod};
    use crate::verify::{verify_partition, Integrity};

    fn key(c: char) -> PartitionKey {
        PartitionKey::from_char(c).unwrap()
    }

    fn rows() -> Vec<SourceRow> {
        vec![
            SourceRow::new("AB1 2CD", 394251, 806376, "S12000033"),
            SourceRow::new("AZ9 8ZZ", 1, 2, "X"),
            SourceRow::new("BB1 1AA", 367684, 428284, "E06000008"),
        ]
    }

    #[test]
    fn test_three_rows_two_partitions() {
        let dataset = Generator::new().generate(rows()).unwrap();

        assert_eq!(dataset.manifest().len(), 2);
        assert_eq!(dataset.record_count(key('A')), 2);
        assert_eq!(dataset.record_count(key('B')), 1);
        assert_eq!(dataset.record_count(key('C')), 0);
        assert!(dataset.partition(key('C')).is_none());

        let a = decode(dataset.partition(key('A')).unwrap()).unwrap();
        let codes: Vec<_> = a.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["AB1 2CD", "AZ9 8ZZ"]);
    }

    #[test]
    fn test_manifest_matches_files() {
        let dataset = Generator::new().generate(rows()).unwrap();
        for (key, bytes) in dataset.partitions() {
            assert_eq!(verify_partition(key, bytes, dataset.manifest()), Integrity::Valid);
        }
    }

    #[test]
    fn test_invalid_row_aborts_run() {
        let mut input = rows();
        input.push(SourceRow::new("9ZZ 1AA", 0, 0, ""));
        assert!(matches!(
            Generator::new().generate(input),
            Err(GenerateError::Schema(SchemaError::OutsideAlphabet(_)))
        ));
    }

    #[test]
    fn test_duplicate_code_aborts_run() {
        let mut input = rows();
        input.push(SourceRow::new("ab12cd", 0, 0, ""));
        assert!(matches!(
            Generator::new().generate(input),
            Err(GenerateError::Schema(SchemaError::DuplicateCode(_)))
        ));
    }

    #[test]
    fn test_empty_input() {
        let dataset = Generator::new().generate(Vec::new()).unwrap();
        assert!(dataset.manifest().is_empty());
        assert_eq!(dataset.total_records(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = GeneratorConfig {
            compression: CompressionMethod::Lz4,
            level: 0,
        };
        let dataset = Generator::from_config(&config).generate(rows()).unwrap();
        let bytes = dataset.partition(key('B')).unwrap();
        assert_eq!(bytes[0], CompressionMethod::Lz4 as u8);
    }
}
