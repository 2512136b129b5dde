//! Detached manifest signatures
//!
//! Ed25519 over the manifest's canonical bytes. The signature artifact is a
//! small JSON document stored next to the manifest:
//!
//! ```text
//! {"algorithm":"ed25519","key_id":"<16 hex>","signature":"<128 hex>","signed_at":"<rfc3339>"}
//! ```
//!
//! `signed_at` is informational and is not covered by the signature.
//! Private keys are supplied per call and never stored or logged.

use crate::error::{SigningError, TrustError};
use crate::manifest::Manifest;
use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

/// Ed25519 key length (secret seed and public key)
pub const KEY_LEN: usize = 32;

/// Ed25519 signature length
pub const SIGNATURE_LEN: usize = 64;

/// Supported signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl std::str::FromStr for SignatureAlgorithm {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            _ => Err(SigningError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Decode a key blob: 32 raw bytes, or 64 hex characters
pub fn decode_key_blob(blob: &[u8]) -> Option<[u8; KEY_LEN]> {
    if blob.len() == KEY_LEN {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(blob);
        return Some(key);
    }

    let text = std::str::from_utf8(blob).ok()?.trim();
    let mut key = [0u8; KEY_LEN];
    hex::decode_to_slice(text, &mut key).ok()?;
    Some(key)
}

/// Ed25519 public key used to verify manifests
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Parse a public key blob (raw or hex)
    ///
    /// Only the length and encoding are checked here; a blob that is not a
    /// valid curve point fails verification later and is reported as forged.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, TrustError> {
        decode_key_blob(blob).map(PublicKey).ok_or_else(|| {
            TrustError::InvalidPublicKey(format!(
                "expected {} raw bytes or {} hex characters, got {} bytes",
                KEY_LEN,
                KEY_LEN * 2,
                blob.len()
            ))
        })
    }

    /// Parse a key written as 64 hex characters (config files)
    pub fn from_hex(text: &str) -> Result<Self, TrustError> {
        let mut key = [0u8; KEY_LEN];
        hex::decode_to_slice(text.trim(), &mut key).map_err(|e| {
            TrustError::InvalidPublicKey(format!(
                "expected {} hex characters: {}",
                KEY_LEN * 2,
                e
            ))
        })?;
        Ok(PublicKey(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier: first 8 bytes of SHA-256(public key), hex
    pub fn key_id(&self) -> String {
        let hash = Sha256::digest(self.0);
        hex::encode(&hash[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Freshly generated signing key pair
pub struct KeyPair {
    secret: [u8; KEY_LEN],
    public: PublicKey,
}

impl KeyPair {
    /// Secret seed; pass to [`sign`]
    pub fn secret(&self) -> &[u8; KEY_LEN] {
        &self.secret
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("secret", &"<redacted>")
            .field("public", &self.public)
            .finish()
    }
}

/// Generate a new Ed25519 key pair from the OS RNG
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    KeyPair {
        secret: signing_key.to_bytes(),
        public: PublicKey(signing_key.verifying_key().to_bytes()),
    }
}

/// Detached signature artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSignature {
    pub algorithm: SignatureAlgorithm,
    pub key_id: String,
    /// Hex-encoded signature bytes
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<String>,
}

impl ManifestSignature {
    /// Serialize the artifact for distribution
    pub fn to_bytes(&self) -> Result<Vec<u8>, SigningError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse an artifact; callers treat failure as a forged signature
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Raw signature bytes, if the hex is well-formed and the right length
    pub fn signature_bytes(&self) -> Option<[u8; SIGNATURE_LEN]> {
        let mut sig = [0u8; SIGNATURE_LEN];
        hex::decode_to_slice(&self.signature, &mut sig).ok()?;
        Some(sig)
    }
}

/// Sign canonical manifest bytes with Ed25519
///
/// # Errors
///
/// Returns `MalformedKey` if `private_key` is not a 32-byte seed (raw or hex).
///
/// # Examples
///
/// ```
/// use postcode_pack::signing::{generate_keypair, sign};
///
/// let keys = generate_keypair();
/// let signature = sign(b"{\"format\":1}", keys.secret()).unwrap();
/// assert_eq!(signature.key_id, keys.public().key_id());
/// ```
pub fn sign(canonical: &[u8], private_key: &[u8]) -> Result<ManifestSignature, SigningError> {
    sign_with(SignatureAlgorithm::Ed25519, canonical, private_key)
}

/// Sign with an explicit algorithm
pub fn sign_with(
    algorithm: SignatureAlgorithm,
    canonical: &[u8],
    private_key: &[u8],
) -> Result<ManifestSignature, SigningError> {
    match algorithm {
        SignatureAlgorithm::Ed25519 => {
            let seed = decode_key_blob(private_key).ok_or_else(|| {
                SigningError::MalformedKey(format!(
                    "expected {} raw bytes or {} hex characters",
                    KEY_LEN,
                    KEY_LEN * 2
                ))
            })?;
            let signing_key = SigningKey::from_bytes(&seed);
            let public = PublicKey(signing_key.verifying_key().to_bytes());
            let signature = signing_key.sign(canonical);

            info!(
                "Signed {} manifest bytes with {} key {}",
                canonical.len(),
                algorithm.name(),
                public.key_id()
            );

            Ok(ManifestSignature {
                algorithm,
                key_id: public.key_id(),
                signature: hex::encode(signature.to_bytes()),
                signed_at: Some(chrono::Utc::now().to_rfc3339()),
            })
        }
    }
}

/// Sign a manifest's canonical bytes
pub fn sign_manifest(
    manifest: &Manifest,
    private_key: &[u8],
) -> Result<ManifestSignature, SigningError> {
    let canonical = manifest.canonical_bytes()?;
    sign(&canonical, private_key)
}
