#![no_main]
use libfuzzer_sys::fuzz_target;
use postcode_pack::{Manifest, ManifestSignature, TrustConfig, Verifier};

fuzz_target!(|data: &[u8]| {
    if let Ok(manifest) = Manifest::from_bytes(data) {
        // Canonical form must parse back to the same manifest
        let canonical = manifest.canonical_bytes().unwrap();
        assert_eq!(Manifest::from_bytes(&canonical).unwrap(), manifest);
    }

    if let Ok(signature) = ManifestSignature::from_bytes(data) {
        let _ = signature.signature_bytes();
    }

    // Split the input into manifest and signature artifact
    let mid = data.len() / 2;
    let verifier = Verifier::new(TrustConfig::verified(
        postcode_pack::PublicKey::from_bytes(&[7u8; 32]).unwrap(),
    ));
    assert!(verifier.open_manifest(&data[..mid], Some(&data[mid..])).is_err());
});
