//! TOML configuration
//!
//! ```toml
//! [trust]
//! mode = "verified"
//! public_key = "<64 hex chars>"
//!
//! [limits]
//! max_decoded_bytes = 268435456
//! max_expansion_ratio = 128
//! ```
//!
//! `[trust]` is required. Skipping signature checks takes an explicit
//! `mode = "insecure"`.

use crate::codec::{ColumnarCodec, CompressionMethod, DecodeLimits};
use crate::error::ConfigError;
use crate::verify::TrustConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    pub trust: TrustConfig,
    #[serde(default)]
    pub limits: DecodeLimits,
}

impl LoaderConfig {
    pub fn new(trust: TrustConfig) -> Self {
        LoaderConfig {
            trust,
            limits: DecodeLimits::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Generator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub compression: CompressionMethod,
    pub level: i32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            compression: CompressionMethod::Zstd,
            level: ColumnarCodec::DEFAULT_ZSTD_LEVEL,
        }
    }
}

impl GeneratorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
