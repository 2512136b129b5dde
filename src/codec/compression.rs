//! Byte-stream compression for partition files
//!
//! **Format**: `[method: u8][payload]`
//! - LZ4: payload is `[uncompressed_size: u32 LE][lz4 block]`
//! - Zstd: payload is a single zstd frame
//!
//! Decompression never allocates more than the caller's capacity: the LZ4
//! size prefix is checked before use and zstd decompresses into a bounded
//! buffer.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// Compression method for partition files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    /// LZ4 compression (fast, moderate ratio)
    Lz4 = 1,
    /// Zstd compression (slower, better ratio)
    Zstd = 2,
}

impl CompressionMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CompressionMethod::Lz4),
            2 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

impl std::str::FromStr for CompressionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lz4" => Ok(CompressionMethod::Lz4),
            "zstd" => Ok(CompressionMethod::Zstd),
            _ => Err(format!(
                "Invalid compression method '{}'. Valid options: lz4, zstd",
                s
            )),
        }
    }
}

const LZ4_SIZE_PREFIX: usize = 4;

/// Compress data and prepend the method byte
pub fn compress(data: &[u8], method: CompressionMethod, level: i32) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![method as u8];
    match method {
        CompressionMethod::Lz4 => {
            out.extend_from_slice(&lz4_flex::compress_prepend_size(data));
        }
        CompressionMethod::Zstd => {
            let compressed = zstd::bulk::compress(data, level)
                .map_err(|e| CodecError::Compression(format!("Zstd compression failed: {}", e)))?;
            out.extend_from_slice(&compressed);
        }
    }
    Ok(out)
}

/// Decompress a method-tagged buffer into at most `capacity` bytes
pub fn decompress(data: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
    let (&method_byte, payload) = data
        .split_first()
        .ok_or_else(|| CodecError::Truncated("missing compression method byte".to_string()))?;
    let method =
        CompressionMethod::from_u8(method_byte).ok_or(CodecError::UnknownCompression(method_byte))?;

    match method {
        CompressionMethod::Lz4 => {
            if payload.len() < LZ4_SIZE_PREFIX {
                return Err(CodecError::Truncated("missing LZ4 size prefix".to_string()));
            }
            let (prefix, block) = payload.split_at(LZ4_SIZE_PREFIX);
            let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            if declared > capacity {
                return Err(CodecError::SizeLimit {
                    declared: declared as u64,
                    limit: capacity as u64,
                });
            }
            lz4_flex::decompress(block, declared)
                .map_err(|e| CodecError::Decompression(format!("LZ4 decompression failed: {}", e)))
        }
        CompressionMethod::Zstd => zstd::bulk::decompress(payload, capacity)
            .map_err(|e| CodecError::Decompression(format!("Zstd decompression failed: {}", e))),
    }
}
