//! Backing stores for published datasets
//!
//! The loader only needs `key -> bytes`; where the bytes come from
//! (directory, embedded resource, network) is up to the store.
//!
//! Directory layout:
//!
//! ```text
//! <root>/
//! ├── manifest.json          # canonical manifest bytes
//! ├── manifest.sig           # detached signature (optional in insecure mode)
//! ├── postcodes_A.part
//! ├── postcodes_B.part
//! └── ...
//! ```

use crate::error::{GenerateError, ManifestError};
use crate::generator::GeneratedDataset;
use crate::record::PartitionKey;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// Signature artifact file name
pub const SIGNATURE_FILE: &str = "manifest.sig";

/// File name for a partition
pub fn partition_file_name(key: PartitionKey) -> String {
    format!("postcodes_{}.part", key)
}

/// Source of manifest, signature and partition bytes
pub trait PartitionStore: Send + Sync {
    fn fetch_manifest(&self) -> io::Result<Vec<u8>>;

    /// Signature artifact, or `None` if the store has none
    fn fetch_signature(&self) -> io::Result<Option<Vec<u8>>>;

    /// Partition bytes; implementations may stop reading after `max_len + 1`
    /// bytes, since anything longer fails verification anyway
    fn fetch_partition(&self, key: PartitionKey, max_len: u64) -> io::Result<Vec<u8>>;
}

impl<T: PartitionStore + ?Sized> PartitionStore for Arc<T> {
    fn fetch_manifest(&self) -> io::Result<Vec<u8>> {
        (**self).fetch_manifest()
    }

    fn fetch_signature(&self) -> io::Result<Option<Vec<u8>>> {
        (**self).fetch_signature()
    }

    fn fetch_partition(&self, key: PartitionKey, max_len: u64) -> io::Result<Vec<u8>> {
        (**self).fetch_partition(key, max_len)
    }
}

/// Dataset published as files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirectoryStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn signature_path(&self) -> PathBuf {
        self.root.join(SIGNATURE_FILE)
    }

    pub fn partition_path(&self, key: PartitionKey) -> PathBuf {
        self.root.join(partition_file_name(key))
    }

    /// Write every partition file, then the manifest
    ///
    /// The manifest goes last (via rename) so a reader never sees a manifest
    /// that lists files which are not there yet.
    pub fn publish(&self, dataset: &GeneratedDataset) -> Result<(), GenerateError> {
        fs::create_dir_all(&self.root)?;

        let mut total = 0u64;
        for (key, bytes) in dataset.partitions() {
            let path = self.partition_path(key);
            fs::write(&path, bytes)?;
            debug!("Wrote {} bytes to {:?}", bytes.len(), path);
            total += bytes.len() as u64;
        }

        let manifest = dataset.manifest_bytes()?;
        write_replacing(&self.manifest_path(), &manifest)?;

        info!(
            "Published {} partitions ({} bytes) to {:?}",
            dataset.manifest().len(),
            total,
            self.root
        );
        Ok(())
    }

    /// Write the detached signature artifact next to the manifest
    pub fn write_signature(&self, artifact: &[u8]) -> io::Result<()> {
        write_replacing(&self.signature_path(), artifact)?;
        info!("Wrote manifest signature to {:?}", self.signature_path());
        Ok(())
    }
}

fn write_replacing(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

impl PartitionStore for DirectoryStore {
    fn fetch_manifest(&self) -> io::Result<Vec<u8>> {
        fs::read(self.manifest_path())
    }

    fn fetch_signature(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.signature_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fetch_partition(&self, key: PartitionKey, max_len: u64) -> io::Result<Vec<u8>> {
        let file = File::open(self.partition_path(key))?;
        let mut bytes = Vec::new();
        file.take(max_len.saturating_add(1)).read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Dataset held in memory (embedded resources, tests)
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    manifest: Vec<u8>,
    signature: Option<Vec<u8>>,
    partitions: HashMap<PartitionKey, Vec<u8>>,
}

impl MemoryStore {
    pub fn new(manifest: Vec<u8>) -> Self {
        MemoryStore {
            manifest,
            ..Default::default()
        }
    }

    /// Store holding a generated dataset's manifest and partitions
    pub fn from_dataset(dataset: &GeneratedDataset) -> Result<Self, ManifestError> {
        let mut store = MemoryStore::new(dataset.manifest_bytes()?);
        for (key, bytes) in dataset.partitions() {
            store.partitions.insert(key, bytes.to_vec());
        }
        Ok(store)
    }

    pub fn with_signature(mut self, artifact: Vec<u8>) -> Self {
        self.signature = Some(artifact);
        self
    }

    pub fn with_manifest(mut self, manifest: Vec<u8>) -> Self {
        self.manifest = manifest;
        self
    }

    /// Add or replace a partition's bytes
    pub fn with_partition(mut self, key: PartitionKey, bytes: Vec<u8>) -> Self {
        self.partitions.insert(key, bytes);
        self
    }

    pub fn partition(&self, key: PartitionKey) -> Option<&[u8]> {
        self.partitions.get(&key).map(Vec::as_slice)
    }
}

impl PartitionStore for MemoryStore {
    fn fetch_manifest(&self) -> io::Result<Vec<u8>> {
        Ok(self.manifest.clone())
    }

    fn fetch_signature(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.signature.clone())
    }

    fn fetch_partition(&self, key: PartitionKey, _max_len: u64) -> io::Result<Vec<u8>> {
        self.partitions.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no bytes for partition {}", key),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use crate::record::SourceRow;
    use tempfile::TempDir;

    fn dataset() -> GeneratedDataset {
        Generator::new()
            .generate(vec![
                SourceRow::new("AB1 2CD", 394251, 806376, "S12000033"),
                SourceRow::new("BB1 1AA", 367684, 428284, "E06000008"),
            ])
            .unwrap()
    }

    #[test]
    fn test_partition_file_name() {
        let key = PartitionKey::from_char('q').unwrap();
        assert_eq!(partition_file_name(key), "postcodes_Q.part");
    }

    #[test]
    fn test_publish_and_fetch() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path().join("out"));
        let dataset = dataset();
        store.publish(&dataset).unwrap();

        assert_eq!(store.fetch_manifest().unwrap(), dataset.manifest_bytes().unwrap());
        assert_eq!(store.fetch_signature().unwrap(), None);

        let a = PartitionKey::from_char('A').unwrap();
        let expected = dataset.partition(a).unwrap();
        let len = expected.len() as u64;
        assert_eq!(store.fetch_partition(a, len).unwrap(), expected);

        assert!(store.partition_path(PartitionKey::from_char('B').unwrap()).is_file());

        let z = PartitionKey::from_char('Z').unwrap();
        assert_eq!(
            store.fetch_partition(z, 10).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_fetch_partition_reads_at_most_max_len_plus_one() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        let key = PartitionKey::from_char('A').unwrap();
        fs::write(store.partition_path(key), vec![0u8; 4096]).unwrap();

        assert_eq!(store.fetch_partition(key, 100).unwrap().len(), 101);
    }

    #[test]
    fn test_write_signature() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.write_signature(b"{}").unwrap();
        assert_eq!(store.fetch_signature().unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_memory_store() {
        let dataset = dataset();
        let store = MemoryStore::from_dataset(&dataset)
            .unwrap()
            .with_signature(b"sig".to_vec());

        let b = PartitionKey::from_char('B').unwrap();
        assert_eq!(store.fetch_partition(b, 0).unwrap(), dataset.partition(b).unwrap());
        assert_eq!(store.fetch_signature().unwrap(), Some(b"sig".to_vec()));
        assert!(store
            .fetch_partition(PartitionKey::from_char('C').unwrap(), 0)
            .is_err());
    }
}
