//! Tampered partitions and manifests must never reach the table

use postcode_pack::{
    generate_keypair, sign, verify_manifest, verify_partition, Authenticity, GeneratedDataset,
    Generator, Integrity, LoadError, Loader, MemoryStore, PartitionKey, SourceRow, TrustConfig,
    TrustError,
};
use proptest::prelude::*;
use std::sync::OnceLock;

fn key(c: char) -> PartitionKey {
    PartitionKey::from_char(c).unwrap()
}

fn dataset() -> &'static GeneratedDataset {
    static DATASET: OnceLock<GeneratedDataset> = OnceLock::new();
    DATASET.get_or_init(|| {
        let rows = (0..200u32).map(|i| {
            SourceRow::new(
                format!("M{} {}AB", i % 60 + 1, i % 10),
                380_000 + i,
                390_000 + i,
                "E08000003",
            )
        });
        let rows: Vec<_> = rows
            .filter({
                let mut seen = std::collections::HashSet::new();
                move |r| seen.insert(r.code.clone())
            })
            .chain([SourceRow::new("AB1 2CD", 394251, 806376, "S12000033")])
            .collect();
        Generator::new().generate(rows).unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_single_byte_flip_is_corrupted(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let dataset = dataset();
        let m = key('M');
        let mut bytes = dataset.partition(m).unwrap().to_vec();
        let pos = index.index(bytes.len());
        bytes[pos] ^= mask;

        prop_assert_eq!(verify_partition(m, &bytes, dataset.manifest()), Integrity::Corrupted);

        let store = MemoryStore::from_dataset(dataset).unwrap().with_partition(m, bytes);
        let loader = Loader::open(store, TrustConfig::insecure()).unwrap();
        let is_corrupted = matches!(loader.ensure_loaded(m), Err(LoadError::Corrupted(_)));
        prop_assert!(is_corrupted);
        prop_assert!(loader.table().is_empty());
    }
}

#[test]
fn test_truncated_and_extended_partitions() {
    let dataset = dataset();
    let m = key('M');
    let original = dataset.partition(m).unwrap();

    let truncated = &original[..original.len() - 1];
    assert_eq!(verify_partition(m, truncated, dataset.manifest()), Integrity::Corrupted);

    let mut extended = original.to_vec();
    extended.push(0);
    assert_eq!(verify_partition(m, &extended, dataset.manifest()), Integrity::Corrupted);

    // A partition the manifest does not list is never accepted
    assert_eq!(
        verify_partition(key('Q'), original, dataset.manifest()),
        Integrity::Unknown
    );
}

#[test]
fn test_swapped_partition_files() {
    let dataset = dataset();
    let a = dataset.partition(key('A')).unwrap().to_vec();
    let store = MemoryStore::from_dataset(dataset)
        .unwrap()
        .with_partition(key('M'), a);

    let loader = Loader::open(store, TrustConfig::insecure()).unwrap();
    assert!(matches!(
        loader.ensure_loaded(key('M')),
        Err(LoadError::Corrupted(_))
    ));
    loader.ensure_loaded(key('A')).unwrap();
    assert_eq!(loader.table().len(), 1);
}

#[test]
fn test_resigned_with_other_key_is_forged() {
    let dataset = dataset();
    let original = generate_keypair();
    let attacker = generate_keypair();
    let manifest_bytes = dataset.manifest_bytes().unwrap();

    let forged = sign(&manifest_bytes, attacker.secret()).unwrap();
    assert_eq!(
        verify_manifest(&manifest_bytes, &forged, &original.public()),
        Authenticity::Forged
    );

    let store = MemoryStore::from_dataset(dataset)
        .unwrap()
        .with_signature(forged.to_bytes().unwrap());
    assert!(matches!(
        Loader::open(store, TrustConfig::verified(original.public())),
        Err(TrustError::Forged)
    ));
}

#[test]
fn test_edited_manifest_is_forged() {
    let dataset = dataset();
    let keys = generate_keypair();
    let signature = dataset.sign(keys.secret()).unwrap().to_bytes().unwrap();

    // Point the manifest at attacker-chosen bytes for partition A
    let evil = Generator::new()
        .generate(vec![SourceRow::new("AB1 2CD", 0, 0, "EVIL")])
        .unwrap();
    let store = MemoryStore::from_dataset(&evil)
        .unwrap()
        .with_signature(signature);

    assert!(matches!(
        Loader::open(store, TrustConfig::verified(keys.public())),
        Err(TrustError::Forged)
    ));
}

#[test]
fn test_lazy_loader_reports_forged_per_partition() {
    let dataset = dataset();
    let keys = generate_keypair();
    let attacker = generate_keypair();
    let forged = dataset.sign(attacker.secret()).unwrap().to_bytes().unwrap();

    let store = MemoryStore::from_dataset(dataset)
        .unwrap()
        .with_signature(forged);
    let loader = Loader::builder(store, TrustConfig::verified(keys.public()))
        .lazy()
        .open()
        .unwrap();

    for c in ['A', 'M'] {
        match loader.ensure_loaded(key(c)) {
            Err(LoadError::Forged { key: k, .. }) => assert_eq!(k, key(c)),
            other => panic!("expected Forged, got {:?}", other),
        }
    }
    assert!(loader.table().is_empty());
    assert!(loader.manifest().is_none());
}

#[test]
fn test_insecure_mode_still_checks_content() {
    let dataset = dataset();
    let store = MemoryStore::from_dataset(dataset)
        .unwrap()
        .with_signature(b"garbage".to_vec())
        .with_partition(key('A'), vec![2, 0, 0, 0]);

    let loader = Loader::open(store, TrustConfig::insecure()).unwrap();
    assert!(matches!(
        loader.ensure_loaded(key('A')),
        Err(LoadError::Corrupted(_))
    ));
}
