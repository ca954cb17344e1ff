//! # kyc-credential: Subject Credentials
//!
//! - **Credential** (`credential.rs`): credential record, canonical claims,
//!   and verification (revoked / expired / tampered / bad signature).
//! - **Store** (`store.rs`): per-subject atomic upsert port and the
//!   `DashMap`-backed in-memory store.
//! - **Issuer** (`issuer.rs`): issue-or-renew, mark-updating and revoke.
//! - **Signing** (`signing.rs`): signer port and Ed25519 implementation.
//!
//! ## Security Invariant
//!
//! A subject has at most one credential. Concurrent issuers for the same
//! subject are serialized by the store's entry lock; the loser receives the
//! credential the winner wrote.

pub mod credential;
pub mod issuer;
pub mod signing;
pub mod store;

pub use credential::{
    verify_credential, Credential, CredentialClaims, CredentialProof, CredentialStatus,
    CredentialVerification, RevocationRecord, VerificationSummary,
};
pub use issuer::{CredentialIssuer, IssuanceReceipt, DEFAULT_VALIDITY_DAYS};
pub use signing::{verify_signature, CredentialSigner, Ed25519Signer, PublicKey, Signature};
pub use store::{CredentialStore, InMemoryCredentialStore, Upsert, UpsertDecision, UpsertOutcome};
