//! # postcode-pack - Signed, Partitioned Postcode Data
//!
//! `postcode-pack` distributes a postcode reference dataset as per-letter
//! compressed partition files plus a signed manifest, and loads partitions
//! on demand with integrity checks before any record reaches memory.
//!
//! - **Generator**: source rows -> `postcodes_<L>.part` files + manifest
//! - **Signer**: Ed25519 detached signature over the manifest bytes
//! - **Loader**: authenticates the manifest once, then verifies each
//!   partition's SHA-512 digest before decoding and merging it
//!
//! ## Quick Start
//!
//! ```rust
//! use postcode_pack::{
//!     generate_keypair, Generator, Loader, MemoryStore, PartitionKey, Result, SourceRow,
//!     TrustConfig,
//! };
//!
//! # fn main() -> Result<()> {
//! // Offline: generate and sign
//! let dataset = Generator::new().generate(vec![
//!     SourceRow::new("AB1 2CD", 394251, 806376, "S12000033"),
//!     SourceRow::new("BB1 1AA", 367684, 428284, "E06000008"),
//! ])?;
//! let keys = generate_keypair();
//! let signature = dataset.sign(keys.secret())?;
//!
//! // Runtime: open with the public key, load on demand
//! let store = MemoryStore::from_dataset(&dataset)?.with_signature(signature.to_bytes()?);
//! let loader = Loader::open(store, TrustConfig::verified(keys.public()))?;
//!
//! loader.ensure_loaded(PartitionKey::from_char('A')?)?;
//! assert_eq!(loader.table().len(), 1);
//!
//! let hits = loader.search("bb1")?;
//! assert_eq!(hits[0].code(), "BB1 1AA");
//! # Ok(())
//! # }
//! ```
//!
//! ## Trust
//!
//! [`TrustConfig`] has no default. Skipping signature checks requires
//! passing [`TrustConfig::Insecure`] explicitly.

pub mod codec;
pub mod config;
pub mod error;
pub mod generator;
pub mod loader;
pub mod manifest;
pub mod record;
pub mod signing;
pub mod store;
pub mod table;
pub mod verify;

pub use codec::{ColumnarCodec, CompressionMethod, DecodeLimits, PartitionCodec};
pub use config::{GeneratorConfig, LoaderConfig};
pub use error::{
    CodecError, ConfigError, Error, GenerateError, LoadError, ManifestError, Result, SchemaError,
    SigningError, TrustError,
};
pub use generator::{GeneratedDataset, Generator};
pub use loader::{Loader, LoaderBuilder};
pub use manifest::{digest, ContentHash, Manifest, ManifestEntry};
pub use record::{abbreviate, normalize_code, PartitionKey, Record, SourceRow};
pub use signing::{generate_keypair, sign, KeyPair, ManifestSignature, PublicKey, SignatureAlgorithm};
pub use store::{DirectoryStore, MemoryStore, PartitionStore};
pub use table::AccumulatedTable;
pub use verify::{verify_manifest, verify_partition, Authenticity, Integrity, TrustConfig, Verifier};
