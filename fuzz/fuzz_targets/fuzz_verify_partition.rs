#![no_main]
use libfuzzer_sys::fuzz_target;
use postcode_pack::{verify_partition, Generator, Integrity, Manifest, PartitionKey, SourceRow};
use std::sync::OnceLock;

fn manifest() -> &'static (Vec<u8>, Manifest) {
    static MANIFEST: OnceLock<(Vec<u8>, Manifest)> = OnceLock::new();
    MANIFEST.get_or_init(|| {
        let dataset = Generator::new()
            .generate(vec![
                SourceRow::new("AB1 2CD", 394251, 806376, "S12000033"),
                SourceRow::new("AZ9 8ZZ", 412000, 801000, "S12000034"),
            ])
            .unwrap();
        let key = PartitionKey::from_char('A').unwrap();
        (dataset.partition(key).unwrap().to_vec(), dataset.manifest().clone())
    })
}

// Only the published bytes verify
fuzz_target!(|data: &[u8]| {
    let (published, manifest) = manifest();
    let key = PartitionKey::from_char('A').unwrap();
    let result = verify_partition(key, data, manifest);
    assert_eq!(result == Integrity::Valid, data == published.as_slice());
});
