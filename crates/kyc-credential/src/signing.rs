//! # Credential Signing
//!
//! Ed25519 proofs over a credential's canonical claims.
//!
//! ## Security Invariant
//!
//! - Signing input is `&CanonicalBytes`. Raw bytes cannot be signed, so a
//!   proof always covers the JCS form of the claims.
//! - Private keys are never serialized or logged. [`Ed25519Signer`] has no
//!   `Serialize` impl and its `Debug` output redacts the key.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use kyc_core::{CanonicalBytes, CryptoError};

/// Port for attaching proofs to credentials.
pub trait CredentialSigner: Send + Sync {
    /// Identifier recorded in the proof (e.g. a key id or DID URL).
    fn signer_id(&self) -> &str;

    fn public_key(&self) -> PublicKey;

    fn sign(&self, claims: &CanonicalBytes) -> Result<Signature, CryptoError>;
}

// ─── Keys and signatures ─────────────────────────────────────────────

/// An Ed25519 public key. Serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

/// An Ed25519 signature. Serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = from_hex(hex, 32).map_err(CryptoError::KeyError)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::KeyError(format!("invalid public key: {e}")))
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = from_hex(hex, 64).map_err(CryptoError::VerificationFailed)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

macro_rules! hex_serde {
    ($name:ident, $label:literal) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let hex = String::deserialize(deserializer)?;
                Self::from_hex(&hex).map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({}...)"), &self.to_hex()[..8])
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

hex_serde!(PublicKey, "PublicKey");
hex_serde!(Signature, "Signature");

/// Verify `signature` over canonical claims.
pub fn verify_signature(
    claims: &CanonicalBytes,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<(), CryptoError> {
    let key = public_key.verifying_key()?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    key.verify(claims.as_bytes(), &sig)
        .map_err(|e| CryptoError::VerificationFailed(format!("Ed25519 verification failed: {e}")))
}

// ─── Ed25519 signer ──────────────────────────────────────────────────

/// In-process Ed25519 [`CredentialSigner`].
pub struct Ed25519Signer {
    id: String,
    signing_key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    /// A signer with a freshly generated key.
    pub fn generate(id: impl Into<String>) -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            id: id.into(),
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// A signer from a 32-byte seed.
    pub fn from_seed(id: impl Into<String>, seed: &[u8; 32]) -> Self {
        Self {
            id: id.into(),
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }
}

impl CredentialSigner for Ed25519Signer {
    fn signer_id(&self) -> &str {
        &self.id
    }

    fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    fn sign(&self, claims: &CanonicalBytes) -> Result<Signature, CryptoError> {
        Ok(Signature(self.signing_key.sign(claims.as_bytes()).to_bytes()))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signer({}, <private>)", self.id)
    }
}

// ─── Hex ─────────────────────────────────────────────────────────────

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(hex: &str, expected_len: usize) -> Result<Vec<u8>, String> {
    let hex = hex.trim();
    if hex.len() != expected_len * 2 {
        return Err(format!(
            "expected {} hex chars, got {}",
            expected_len * 2,
            hex.len()
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at position {i}"))
        })
        .collect()
}
