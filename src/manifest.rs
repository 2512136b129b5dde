//! Partition manifest
//!
//! Maps each published partition to the SHA-512 digest and byte length of
//! its compressed file. The manifest's canonical bytes are what gets
//! signed, so their layout is fixed:
//!
//! ```text
//! {"format":1,"digest":"sha512","partitions":{"A":{"content_hash":"<hex>","byte_length":N},...}}
//! ```
//!
//! - Partitions are held in a `BTreeMap`, so key order is alphabetical no
//!   matter what order they were built in.
//! - Struct fields serialize in declaration order.
//! - No whitespace, no timestamps.
//!
//! Digests are of the compressed file bytes, computed once at generation
//! time and never recomputed from decoded content.

use crate::error::ManifestError;
use crate::record::PartitionKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fmt;

/// Manifest layout version
pub const MANIFEST_FORMAT: u32 = 1;

/// Digest algorithm name recorded in the manifest
pub const DIGEST_ALGORITHM: &str = "sha512";

/// Size of a content hash in bytes
pub const CONTENT_HASH_LEN: usize = 64;

/// SHA-512 digest of a partition file
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; CONTENT_HASH_LEN]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; CONTENT_HASH_LEN]) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Full-length comparison; does not stop at the first differing byte
    pub fn matches(&self, other: &ContentHash) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; CONTENT_HASH_LEN];
        hex::decode_to_slice(&s, &mut bytes).map_err(|e| {
            serde::de::Error::custom(format!("content_hash must be 128 hex chars: {}", e))
        })?;
        Ok(ContentHash(bytes))
    }
}

/// Compute the content hash of a partition file
pub fn digest(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    let mut out = [0u8; CONTENT_HASH_LEN];
    out.copy_from_slice(&hasher.finalize());
    ContentHash(out)
}

/// One manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub content_hash: ContentHash,
    pub byte_length: u64,
}

/// Partition key -> expected digest and length
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    format: u32,
    digest: String,
    partitions: BTreeMap<PartitionKey, ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from partition files
    ///
    /// Input order does not matter; the result is keyed alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePartition` if a key appears twice.
    ///
    /// # Examples
    ///
    /// ```
    /// use postcode_pack::{Manifest, PartitionKey};
    ///
    /// let a = PartitionKey::from_char('A').unwrap();
    /// let b = PartitionKey::from_char('B').unwrap();
    ///
    /// let forward = Manifest::build([(a, b"aaa".as_slice()), (b, b"bb".as_slice())]).unwrap();
    /// let reverse = Manifest::build([(b, b"bb".as_slice()), (a, b"aaa".as_slice())]).unwrap();
    /// assert_eq!(forward.canonical_bytes().unwrap(), reverse.canonical_bytes().unwrap());
    /// ```
    pub fn build<I, B>(files: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = (PartitionKey, B)>,
        B: AsRef<[u8]>,
    {
        let mut partitions = BTreeMap::new();
        for (key, bytes) in files {
            let bytes = bytes.as_ref();
            let entry = ManifestEntry {
                content_hash: digest(bytes),
                byte_length: bytes.len() as u64,
            };
            if partitions.insert(key, entry).is_some() {
                return Err(ManifestError::DuplicatePartition(key));
            }
        }

        Ok(Manifest {
            format: MANIFEST_FORMAT,
            digest: DIGEST_ALGORITHM.to_string(),
            partitions,
        })
    }

    /// Deterministic byte form covered by the signature
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse manifest bytes
    ///
    /// Authenticity is not checked here; verify the raw bytes against the
    /// signature before trusting the result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed(e.to_string()))?;

        if manifest.format != MANIFEST_FORMAT {
            return Err(ManifestError::UnsupportedFormat(manifest.format));
        }
        if manifest.digest != DIGEST_ALGORITHM {
            return Err(ManifestError::Malformed(format!(
                "unsupported digest algorithm '{}'",
                manifest.digest
            )));
        }
        Ok(manifest)
    }

    /// Entry for a partition, if it was published
    pub fn lookup(&self, key: PartitionKey) -> Option<&ManifestEntry> {
        self.partitions.get(&key)
    }

    pub fn contains(&self, key: PartitionKey) -> bool {
        self.partitions.contains_key(&key)
    }

    /// Published partitions in alphabetical order
    pub fn keys(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.partitions.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (PartitionKey, &ManifestEntry)> + '_ {
        self.partitions.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Sum of all partition file sizes
    pub fn total_bytes(&self) -> u64 {
        self.partitions.values().map(|e| e.byte_length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> PartitionKey {
        PartitionKey::from_char(c).unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let manifest =
            Manifest::build([(key('B'), b"second".to_vec()), (key('A'), b"first".to_vec())])
                .unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec![key('A'), key('B')]);

        let entry = manifest.lookup(key('A')).unwrap();
        assert_eq!(entry.byte_length, 5);
        assert_eq!(entry.content_hash, digest(b"first"));
        assert!(manifest.lookup(key('Z')).is_none());
        assert_eq!(manifest.total_bytes(), 11);
    }

    #[test]
    fn test_duplicate_partition() {
        let result = Manifest::build([(key('A'), b"x"), (key('A'), b"y")]);
        assert_eq!(result, Err(ManifestError::DuplicatePartition(key('A'))));
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let files: Vec<(PartitionKey, Vec<u8>)> = PartitionKey::all()
            .take(6)
            .map(|k| (k, vec![k.as_char() as u8; 10 + k.index()]))
            .collect();

        let forward = Manifest::build(files.clone()).unwrap();
        let reverse = Manifest::build(files.into_iter().rev()).unwrap();

        let bytes = forward.canonical_bytes().unwrap();
        assert_eq!(bytes, forward.canonical_bytes().unwrap());
        assert_eq!(bytes, reverse.canonical_bytes().unwrap());
    }

    #[test]
    fn test_canonical_layout() {
        let manifest = Manifest::build([(key('A'), b"")]).unwrap();
        let text = String::from_utf8(manifest.canonical_bytes().unwrap()).unwrap();
        let expected = format!(
            "{{\"format\":1,\"digest\":\"sha512\",\"partitions\":{{\"A\":{{\"content_hash\":\"{}\",\"byte_length\":0}}}}}}",
            digest(b"").to_hex()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_parse_roundtrip() {
        let manifest = Manifest::build([(key('C'), b"abc"), (key('X'), b"xyz")]).unwrap();
        let bytes = manifest.canonical_bytes().unwrap();
        assert_eq!(Manifest::from_bytes(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            Manifest::from_bytes(b"not json"),
            Err(ManifestError::Malformed(_))
        ));
        assert!(matches!(
            Manifest::from_bytes(br#"{"format":2,"digest":"sha512","partitions":{}}"#),
            Err(ManifestError::UnsupportedFormat(2))
        ));
        assert!(matches!(
            Manifest::from_bytes(br#"{"format":1,"digest":"md5","partitions":{}}"#),
            Err(ManifestError::Malformed(_))
        ));
        assert!(matches!(
            Manifest::from_bytes(
                br#"{"format":1,"digest":"sha512","partitions":{"A":{"content_hash":"abcd","byte_length":1}}}"#
            ),
            Err(ManifestError::Malformed(_))
        ));
        assert!(matches!(
            Manifest::from_bytes(br#"{"format":1,"digest":"sha512","partitions":{"7":null}}"#),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn test_hash_matches() {
        let a = digest(b"one");
        let b = digest(b"two");
        assert!(a.matches(&a));
        assert!(!a.matches(&b));
    }
}
