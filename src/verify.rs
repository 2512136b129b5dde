//! Trust boundary: manifest authenticity and partition integrity
//!
//! Two independent checks, both required before any partition byte reaches
//! the codec:
//!
//! 1. **Authenticity**: the manifest's raw bytes carry a valid Ed25519
//!    signature from the configured public key. Skipped only when the
//!    caller explicitly configured [`TrustConfig::Insecure`].
//! 2. **Integrity**: a partition file's SHA-512 digest and length match its
//!    manifest entry.
//!
//! Malformed signatures, unknown key ids and invalid key points all come
//! back as [`Authenticity::Forged`]; nothing in here turns a bad signature
//! into an error path that skips the check.

use crate::error::TrustError;
use crate::manifest::{digest, Manifest};
use crate::record::PartitionKey;
use crate::signing::{ManifestSignature, PublicKey};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How manifest authenticity is established
///
/// There is deliberately no `Default`: insecure mode must be spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TrustConfig {
    /// Require a valid signature from this key
    Verified { public_key: PublicKey },
    /// Skip signature checking (non-production use only)
    Insecure,
}

impl TrustConfig {
    pub fn verified(public_key: PublicKey) -> Self {
        TrustConfig::Verified { public_key }
    }

    pub fn insecure() -> Self {
        TrustConfig::Insecure
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, TrustConfig::Insecure)
    }
}

/// Result of a manifest authenticity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticity {
    Authentic,
    Forged,
}

/// Result of a partition integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// Digest and length match the manifest entry
    Valid,
    /// Digest or length differ
    Corrupted,
    /// The manifest has no entry for this partition
    Unknown,
}

/// Check a detached signature over raw manifest bytes
///
/// `manifest_bytes` must be exactly the bytes that were signed; they are not
/// re-serialized.
pub fn verify_manifest(
    manifest_bytes: &[u8],
    signature: &ManifestSignature,
    public_key: &PublicKey,
) -> Authenticity {
    if signature.key_id != public_key.key_id() {
        warn!(
            "Manifest signed by key {}, expected {}",
            signature.key_id,
            public_key.key_id()
        );
        return Authenticity::Forged;
    }

    let Some(sig_bytes) = signature.signature_bytes() else {
        warn!("Manifest signature is not {} hex-encoded bytes", crate::signing::SIGNATURE_LEN);
        return Authenticity::Forged;
    };

    let verifying_key = match VerifyingKey::from_bytes(public_key.as_bytes()) {
        Ok(key) => key,
        Err(e) => {
            warn!("Configured public key is not a valid Ed25519 point: {}", e);
            return Authenticity::Forged;
        }
    };

    let sig = Signature::from_bytes(&sig_bytes);
    match verifying_key.verify_strict(manifest_bytes, &sig) {
        Ok(()) => Authenticity::Authentic,
        Err(e) => {
            warn!("Manifest signature verification failed: {}", e);
            Authenticity::Forged
        }
    }
}

/// Check a partition file against its manifest entry
pub fn verify_partition(key: PartitionKey, file_bytes: &[u8], manifest: &Manifest) -> Integrity {
    let Some(entry) = manifest.lookup(key) else {
        return Integrity::Unknown;
    };

    if file_bytes.len() as u64 != entry.byte_length {
        warn!(
            "Partition {} is {} bytes, manifest says {}",
            key,
            file_bytes.len(),
            entry.byte_length
        );
        return Integrity::Corrupted;
    }

    if digest(file_bytes).matches(&entry.content_hash) {
        debug!("Partition {} digest verified", key);
        Integrity::Valid
    } else {
        warn!("Partition {} digest does not match manifest", key);
        Integrity::Corrupted
    }
}

/// Applies a [`TrustConfig`] to manifest artifacts
#[derive(Debug, Clone)]
pub struct Verifier {
    trust: TrustConfig,
}

impl Verifier {
    pub fn new(trust: TrustConfig) -> Self {
        Verifier { trust }
    }

    pub fn trust(&self) -> &TrustConfig {
        &self.trust
    }

    /// Decide whether manifest bytes are authentic under this configuration
    ///
    /// `signature` is the raw signature artifact, if one was found. An
    /// unparseable artifact counts as forged.
    pub fn authenticate(
        &self,
        manifest_bytes: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<(), TrustError> {
        let public_key = match &self.trust {
            TrustConfig::Insecure => {
                warn!("Manifest authenticity check skipped: trust mode is 'insecure'");
                return Ok(());
            }
            TrustConfig::Verified { public_key } => public_key,
        };

        let artifact = signature.ok_or(TrustError::MissingSignature)?;
        let signature = match ManifestSignature::from_bytes(artifact) {
            Ok(sig) => sig,
            Err(e) => {
                warn!("Manifest signature artifact is malformed: {}", e);
                return Err(TrustError::Forged);
            }
        };

        match verify_manifest(manifest_bytes, &signature, public_key) {
            Authenticity::Authentic => {
                debug!("Manifest authenticated with key {}", public_key.key_id());
                Ok(())
            }
            Authenticity::Forged => Err(TrustError::Forged),
        }
    }

    /// Authenticate, then parse the manifest
    pub fn open_manifest(
        &self,
        manifest_bytes: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<Manifest, TrustError> {
        self.authenticate(manifest_bytes, signature)?;
        Ok(Manifest::from_bytes(manifest_bytes)?)
    }

    pub fn verify_partition(
        &self,
        key: PartitionKey,
        file_bytes: &[u8],
        manifest: &Manifest,
    ) -> Integrity {
        verify_partition(key, file_bytes, manifest)
    }
}
