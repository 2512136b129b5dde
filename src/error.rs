//! Error types for the signed partition pipeline
//!
//! One enum per concern, matching where the failure can happen:
//! generation (`SchemaError`, `GenerateError`), signing (`SigningError`),
//! opening a loader (`TrustError`) and loading one partition (`LoadError`).
//! [`Error`] wraps all of them for callers that just want `?`.

use crate::record::PartitionKey;
use std::sync::Arc;
use thiserror::Error;

/// Bad input row shape or content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Postcode is empty")]
    EmptyCode,

    #[error("Postcode '{0}' does not start with a letter A-Z")]
    OutsideAlphabet(String),

    #[error("Invalid postcode '{code}': {reason}")]
    InvalidCode { code: String, reason: String },

    #[error("Duplicate postcode '{0}'")]
    DuplicateCode(String),

    #[error("Invalid partition key: {0:?}")]
    InvalidPartitionKey(String),
}

/// Partition encode/decode failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Partition data truncated: {0}")]
    Truncated(String),

    #[error("Unknown compression method: {0}")]
    UnknownCompression(u8),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Declared size {declared} exceeds limit {limit}")]
    SizeLimit { declared: u64, limit: u64 },

    #[error("Input length {actual} does not match expected length {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported frame format: {0}")]
    UnsupportedFormat(u16),

    #[error("Missing column: {0}")]
    MissingColumn(&'static str),

    #[error("Column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Column '{column}' has {found} values, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] SchemaError),

    #[error("Record '{code}' does not belong to partition {expected}")]
    PartitionMismatch { expected: PartitionKey, code: String },
}

/// Manifest construction and parsing failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Partition {0} listed twice")]
    DuplicatePartition(PartitionKey),

    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(u32),

    #[error("Malformed manifest: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ManifestError {
    fn from(e: serde_json::Error) -> Self {
        ManifestError::Serialization(e.to_string())
    }
}

/// Signing failures (fatal to a generation run)
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Malformed signing key: {0}")]
    MalformedKey(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Manifest authenticity failures at loader open
#[derive(Error, Debug, Clone)]
pub enum TrustError {
    #[error("Manifest signature is missing and trust mode is 'verified'")]
    MissingSignature,

    #[error("Manifest signature is not valid for the configured public key")]
    Forged,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Manifest rejected: {0}")]
    MalformedManifest(#[from] ManifestError),

    #[error("I/O error reading trust material: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for TrustError {
    fn from(e: std::io::Error) -> Self {
        TrustError::Io(Arc::new(e))
    }
}

/// Per-partition load failures
///
/// Fatal to one `ensure_loaded` call only; partitions merged earlier and the
/// loader itself stay usable.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("Partition {0} does not exist upstream")]
    NotFound(PartitionKey),

    #[error("Manifest for partition {key} failed authentication: {reason}")]
    Forged { key: PartitionKey, reason: String },

    #[error("Partition {0} failed content hash verification")]
    Corrupted(PartitionKey),

    #[error("Partition {key} could not be decoded: {source}")]
    Codec {
        key: PartitionKey,
        #[source]
        source: CodecError,
    },

    #[error("I/O error fetching partition {key}: {source}")]
    Io {
        key: PartitionKey,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl LoadError {
    pub(crate) fn io(key: PartitionKey, e: std::io::Error) -> Self {
        LoadError::Io {
            key,
            source: Arc::new(e),
        }
    }

    /// Partition key the failure belongs to
    pub fn key(&self) -> PartitionKey {
        match self {
            LoadError::NotFound(key) | LoadError::Corrupted(key) => *key,
            LoadError::Forged { key, .. }
            | LoadError::Codec { key, .. }
            | LoadError::Io { key, .. } => *key,
        }
    }

    /// Only fetch failures are candidates for caller-driven retry
    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::Io { .. })
    }
}

/// Generation run failures (all-or-nothing)
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Encoding partition {key} failed: {source}")]
    Codec {
        key: PartitionKey,
        #[source]
        source: CodecError,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any error produced by this crate
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
