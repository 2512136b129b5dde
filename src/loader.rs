//! On-demand partition loading
//!
//! A [`Loader`] authenticates the manifest once, then loads partitions as
//! they are asked for:
//!
//! ```text
//! fetch -> length + SHA-512 check -> decode -> membership check -> merge
//! ```
//!
//! Any failure leaves the accumulated table untouched.
//!
//! ## Concurrency
//!
//! Each partition key has its own slot (mutex + condvar); there is no
//! cross-key lock, so distinct keys load in parallel. For a single key at
//! most one load runs at a time. Callers that arrive while it is in flight
//! wait and observe its outcome. A later caller after a failure starts a
//! fresh attempt.
//!
//! [`Loader::table`] hands out a snapshot; the table lock is held only while
//! a merge swaps in the next version, never while callers read.

use crate::codec::{ColumnarCodec, DecodeLimits, PartitionCodec};
use crate::config::LoaderConfig;
use crate::error::{CodecError, LoadError, TrustError};
use crate::manifest::Manifest;
use crate::record::{abbreviate, PartitionKey, Record};
use crate::store::PartitionStore;
use crate::table::AccumulatedTable;
use crate::verify::{Integrity, TrustConfig, Verifier};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Load state of one partition key
#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    InFlight,
    Merged,
    Failed(LoadError),
}

#[derive(Debug, Default)]
struct LoadSlot {
    phase: Mutex<Phase>,
    settled: Condvar,
}

/// Publishes the outcome of an in-flight load
///
/// If the loading thread unwinds before an outcome is set, the slot goes
/// back to `Idle` so waiters retry instead of blocking forever.
struct InFlightGuard<'a> {
    slot: &'a LoadSlot,
    outcome: Option<Phase>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let next = self.outcome.take().unwrap_or(Phase::Idle);
        *self.slot.phase.lock() = next;
        self.slot.settled.notify_all();
    }
}

/// Builder for [`Loader`]
pub struct LoaderBuilder {
    store: Box<dyn PartitionStore>,
    trust: TrustConfig,
    codec: Box<dyn PartitionCodec>,
    limits: DecodeLimits,
    lazy: bool,
}

impl LoaderBuilder {
    /// Codec used to decode partitions (default: columnar)
    pub fn codec<C: PartitionCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Defer manifest fetch and authentication to the first load
    ///
    /// A rejected manifest then surfaces as `LoadError::Forged` from every
    /// load instead of a `TrustError` here.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Build the loader, authenticating the manifest unless lazy
    pub fn open(self) -> Result<Loader, TrustError> {
        let loader = Loader {
            store: self.store,
            codec: self.codec,
            verifier: Verifier::new(self.trust),
            limits: self.limits,
            manifest: OnceLock::new(),
            rejection: Mutex::new(None),
            slots: std::array::from_fn(|_| LoadSlot::default()),
            table: RwLock::new(Arc::new(AccumulatedTable::new())),
        };

        if !self.lazy {
            let manifest = loader.fetch_manifest()?;
            let _ = loader.manifest.set(manifest);
        }

        Ok(loader)
    }
}

/// Session over one published dataset
pub struct Loader {
    store: Box<dyn PartitionStore>,
    codec: Box<dyn PartitionCodec>,
    verifier: Verifier,
    limits: DecodeLimits,
    manifest: OnceLock<Manifest>,
    /// Cached authentication failure (lazy mode)
    rejection: Mutex<Option<TrustError>>,
    slots: [LoadSlot; PartitionKey::COUNT],
    table: RwLock<Arc<AccumulatedTable>>,
}

impl Loader {
    /// Fetch and authenticate the manifest, then return a ready loader
    ///
    /// # Errors
    ///
    /// Returns `TrustError` if the signature is missing (in verified mode),
    /// does not verify, or the manifest cannot be fetched or parsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use postcode_pack::{Generator, Loader, MemoryStore, PartitionKey, SourceRow, TrustConfig};
    ///
    /// let dataset = Generator::new()
    ///     .generate(vec![SourceRow::new("AB1 2CD", 394251, 806376, "S12000033")])
    ///     .unwrap();
    /// let store = MemoryStore::from_dataset(&dataset).unwrap();
    ///
    /// let loader = Loader::open(store, TrustConfig::insecure()).unwrap();
    /// loader.ensure_loaded(PartitionKey::from_char('A').unwrap()).unwrap();
    /// assert_eq!(loader.table().len(), 1);
    /// ```
    pub fn open<S: PartitionStore + 'static>(
        store: S,
        trust: TrustConfig,
    ) -> Result<Loader, TrustError> {
        Self::builder(store, trust).open()
    }

    pub fn builder<S: PartitionStore + 'static>(store: S, trust: TrustConfig) -> LoaderBuilder {
        LoaderBuilder {
            store: Box::new(store),
            trust,
            codec: Box::new(ColumnarCodec::default()),
            limits: DecodeLimits::default(),
            lazy: false,
        }
    }

    pub fn from_config<S: PartitionStore + 'static>(
        store: S,
        config: &LoaderConfig,
    ) -> Result<Loader, TrustError> {
        Self::builder(store, config.trust.clone())
            .limits(config.limits)
            .open()
    }

    pub fn trust(&self) -> &TrustConfig {
        self.verifier.trust()
    }

    /// Authenticated manifest, once it has been opened
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.get()
    }

    /// Partitions the manifest lists (empty until the manifest is opened)
    pub fn available_partitions(&self) -> Vec<PartitionKey> {
        self.manifest()
            .map(|m| m.keys().collect())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, key: PartitionKey) -> bool {
        self.table.read().contains_partition(key)
    }

    /// Snapshot of everything merged so far
    ///
    /// The snapshot does not change as later partitions merge; call again
    /// for a fresh view. Holding it never blocks a load.
    pub fn table(&self) -> Arc<AccumulatedTable> {
        Arc::clone(&self.table.read())
    }

    /// Make sure a partition is merged into the table
    ///
    /// Returns immediately if it already is. Otherwise runs the full
    /// fetch/verify/decode/merge pipeline, or waits for a concurrent caller
    /// already running it for the same key.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the manifest has no entry for `key`
    /// - `Forged`: the manifest failed authentication (lazy mode only)
    /// - `Corrupted`: length or digest mismatch
    /// - `Codec`: verified bytes failed to decode
    /// - `Io`: the store could not supply the bytes
    pub fn ensure_loaded(&self, key: PartitionKey) -> Result<(), LoadError> {
        let slot = &self.slots[key.index()];
        let mut phase = slot.phase.lock();
        let mut waited = false;

        loop {
            match &*phase {
                Phase::Merged => return Ok(()),
                Phase::Failed(err) if waited => return Err(err.clone()),
                Phase::Idle | Phase::Failed(_) => break,
                Phase::InFlight => {}
            }
            debug!("Waiting for in-flight load of partition {}", key);
            slot.settled.wait(&mut phase);
            waited = true;
        }

        *phase = Phase::InFlight;
        drop(phase);

        let mut guard = InFlightGuard {
            slot,
            outcome: None,
        };
        let result = self.load(key);
        guard.outcome = Some(match &result {
            Ok(()) => Phase::Merged,
            Err(err) => Phase::Failed(err.clone()),
        });
        drop(guard);

        if let Err(err) = &result {
            warn!("Loading partition {} failed: {}", key, err);
        }
        result
    }

    /// Load several partitions, distinct keys in parallel
    ///
    /// Every key is attempted; the first error in key order is returned
    /// after all attempts settle.
    pub fn ensure_loaded_all<I>(&self, keys: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = PartitionKey>,
    {
        let keys: BTreeSet<PartitionKey> = keys.into_iter().collect();
        if keys.len() <= 1 {
            return keys.into_iter().try_for_each(|key| self.ensure_loaded(key));
        }

        let results = crossbeam::scope(|scope| {
            let handles: Vec<_> = keys
                .iter()
                .map(|&key| scope.spawn(move |_| self.ensure_loaded(key)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        results.into_iter().collect()
    }

    /// Records whose code starts with `prefix`, ignoring spacing and case
    ///
    /// Loads the partition of the prefix's first letter if needed. A letter
    /// with no published partition yields no matches.
    pub fn search(&self, prefix: &str) -> Result<Vec<Record>, LoadError> {
        let Some(key) = abbreviate(prefix)
            .chars()
            .next()
            .and_then(|c| PartitionKey::from_char(c).ok())
        else {
            return Ok(Vec::new());
        };

        match self.ensure_loaded(key) {
            Ok(()) => {}
            Err(LoadError::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }

        Ok(self.table().search(prefix).into_iter().cloned().collect())
    }

    /// Find one record by postcode, loading its partition if needed
    pub fn lookup(&self, code: &str) -> Result<Option<Record>, LoadError> {
        let Ok(key) = PartitionKey::for_code(code) else {
            return Ok(None);
        };

        match self.ensure_loaded(key) {
            Ok(()) => Ok(self.table().get(code).cloned()),
            Err(LoadError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn fetch_manifest(&self) -> Result<Manifest, TrustError> {
        let bytes = self.store.fetch_manifest()?;
        let signature = self.store.fetch_signature()?;
        let manifest = self.verifier.open_manifest(&bytes, signature.as_deref())?;

        info!(
            "Opened manifest: {} partitions, {} bytes (trust: {})",
            manifest.len(),
            manifest.total_bytes(),
            if self.verifier.trust().is_insecure() {
                "insecure"
            } else {
                "verified"
            }
        );
        Ok(manifest)
    }

    /// Authenticated manifest, opening it on first use in lazy mode
    fn authenticated_manifest(&self, key: PartitionKey) -> Result<&Manifest, LoadError> {
        if let Some(manifest) = self.manifest.get() {
            return Ok(manifest);
        }

        let mut rejection = self.rejection.lock();
        if let Some(manifest) = self.manifest.get() {
            return Ok(manifest);
        }
        if let Some(err) = rejection.as_ref() {
            return Err(rejected(key, err.clone()));
        }

        match self.fetch_manifest() {
            Ok(manifest) => Ok(self.manifest.get_or_init(|| manifest)),
            Err(err) => {
                if !matches!(err, TrustError::Io(_)) {
                    *rejection = Some(err.clone());
                }
                Err(rejected(key, err))
            }
        }
    }

    fn load(&self, key: PartitionKey) -> Result<(), LoadError> {
        let manifest = self.authenticated_manifest(key)?;
        let entry = manifest.lookup(key).ok_or(LoadError::NotFound(key))?;

        let bytes = self
            .store
            .fetch_partition(key, entry.byte_length)
            .map_err(|e| LoadError::io(key, e))?;

        match self.verifier.verify_partition(key, &bytes, manifest) {
            Integrity::Valid => {}
            Integrity::Corrupted => return Err(LoadError::Corrupted(key)),
            Integrity::Unknown => return Err(LoadError::NotFound(key)),
        }

        let limits = self.limits.with_expected_len(entry.byte_length);
        let records = self
            .codec
            .decode(&bytes, &limits)
            .and_then(|records| check_membership(key, records))
            .map_err(|source| LoadError::Codec { key, source })?;

        let count = records.len();
        {
            let mut table = self.table.write();
            Arc::make_mut(&mut table).merge(key, records);
        }

        info!(
            "Loaded partition {}: {} records from {} bytes ({})",
            key,
            count,
            bytes.len(),
            self.codec.name()
        );
        Ok(())
    }
}

fn rejected(key: PartitionKey, err: TrustError) -> LoadError {
    match err {
        TrustError::Io(source) => LoadError::Io { key, source },
        other => LoadError::Forged {
            key,
            reason: other.to_string(),
        },
    }
}

fn check_membership(key: PartitionKey, records: Vec<Record>) -> Result<Vec<Record>, CodecError> {
    match records.iter().find(|r| r.partition_key() != key) {
        Some(stray) => Err(CodecError::PartitionMismatch {
            expected: key,
            code: stray.code().to_string(),
        }),
        None => Ok(records),
    }
}
