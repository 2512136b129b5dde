//! Partition codec: records <-> compressed bytes
//!
//! Two stages: a self-describing columnar frame ([`frame`]) followed by a
//! general-purpose compressor ([`compression`]). The [`PartitionCodec`]
//! trait is the only thing the generator and loader depend on, so the wire
//! format can be swapped without touching verification.
//!
//! The codec makes no trust decisions. Callers verify bytes before handing
//! them to [`PartitionCodec::decode`].

pub mod compression;
pub mod frame;

use crate::error::CodecError;
use crate::record::Record;
use serde::{Deserialize, Serialize};

pub use compression::CompressionMethod;

/// Bounds applied while decoding untrusted bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    /// Hard cap on the decompressed frame size
    pub max_decoded_bytes: u64,

    /// Cap on decompressed size relative to the compressed input
    pub max_expansion_ratio: u32,

    /// Known length of the input (from the manifest), checked before decoding
    #[serde(skip)]
    pub expected_len: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_decoded_bytes: 256 * 1024 * 1024,
            max_expansion_ratio: 128,
            expected_len: None,
        }
    }
}

impl DecodeLimits {
    /// Same limits, pinned to an input length known in advance
    pub fn with_expected_len(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Validate the input length and compute the decompression capacity
    pub fn capacity_for(&self, input_len: usize) -> Result<usize, CodecError> {
        let actual = input_len as u64;
        if let Some(expected) = self.expected_len {
            if expected != actual {
                return Err(CodecError::LengthMismatch { expected, actual });
            }
        }

        let by_ratio = actual.saturating_mul(u64::from(self.max_expansion_ratio));
        let capacity = by_ratio.min(self.max_decoded_bytes);
        usize::try_from(capacity).map_err(|_| CodecError::SizeLimit {
            declared: capacity,
            limit: usize::MAX as u64,
        })
    }
}

/// Encode/decode contract for one partition's records
///
/// Implementations must satisfy `decode(encode(x)) == x` and must fail with
/// a `CodecError` (never panic or return partial data) on malformed input.
pub trait PartitionCodec: Send + Sync {
    /// Short identifier, used in logs
    fn name(&self) -> &'static str;

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8], limits: &DecodeLimits) -> Result<Vec<Record>, CodecError>;
}

/// Columnar bincode frame + LZ4/Zstd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnarCodec {
    method: CompressionMethod,
    level: i32,
}

impl ColumnarCodec {
    /// Default zstd level for published partitions (offline, favour ratio)
    pub const DEFAULT_ZSTD_LEVEL: i32 = 19;

    pub fn new(method: CompressionMethod, level: i32) -> Self {
        ColumnarCodec { method, level }
    }

    pub fn zstd() -> Self {
        Self::new(CompressionMethod::Zstd, Self::DEFAULT_ZSTD_LEVEL)
    }

    pub fn lz4() -> Self {
        Self::new(CompressionMethod::Lz4, 0)
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }
}

impl Default for ColumnarCodec {
    fn default() -> Self {
        Self::zstd()
    }
}

impl PartitionCodec for ColumnarCodec {
    fn name(&self) -> &'static str {
        match self.method {
            CompressionMethod::Lz4 => "columnar+lz4",
            CompressionMethod::Zstd => "columnar+zstd",
        }
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>, CodecError> {
        let serialized = frame::write_frame(records)?;
        compression::compress(&serialized, self.method, self.level)
    }

    /// Decoding accepts either compression method; the method byte in the
    /// input decides, not `self.method`.
    fn decode(&self, bytes: &[u8], limits: &DecodeLimits) -> Result<Vec<Record>, CodecError> {
        let capacity = limits.capacity_for(bytes.len())?;
        let serialized = compression::decompress(bytes, capacity)?;
        frame::read_frame(&serialized)
    }
}

/// Encode records with the default codec
pub fn encode(records: &[Record]) -> Result<Vec<u8>, CodecError> {
    ColumnarCodec::default().encode(records)
}

/// Decode bytes with the default codec and limits
pub fn decode(bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
    ColumnarCodec::default().decode(bytes, &DecodeLimits::default())
}
